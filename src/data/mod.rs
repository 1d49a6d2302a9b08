/// Data layer: core types, file formats, and range selection.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv      curves.csv / restrictions.csv      .prm
///        │                              │                            │
///        ▼                              ▼                            ▼
///   ┌──────────┐                 ┌────────────┐               ┌──────────┐
///   │  loader   │  → Series      │  exchange   │ → elements,   │  params   │ → ParameterSet
///   └──────────┘                 └────────────┘   zones        └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  work-section crop, zones per sample
///   └──────────┘
/// ```

pub mod exchange;
pub mod filter;
pub mod loader;
pub mod model;
pub mod params;
