//! Built-in materials tables.
//!
//! Both tables hold the same four materials. The scalar table carries one
//! value per property; the range table carries `<Property> min` and
//! `<Property> max` column pairs. Values are typical handbook figures:
//! density in g/cm³, temperatures in °C, strength in MPa, conductivity in
//! W/(m·K).

use matscout_contracts::error::HarnessResult;
use matscout_store::{MaterialStore, StoreSettings};

pub const SCALAR_TABLE: &str = "\
Material,Density,Melting point,Yield strength,Thermal conductivity
Copper,8.96,1085,70,401
Aluminum,2.70,660,35,237
Iron,7.87,1538,80,80
Wood,0.6,,40,0.15
";

pub const RANGE_TABLE: &str = "\
Material,Density min,Density max,Melting point min,Melting point max,Yield strength min,Yield strength max
Copper,8.9,8.96,1083,1085,70,220
Aluminum,2.6,2.8,640,660,30,280
Iron,7.8,7.9,1530,1538,80,300
Wood,0.3,1.3,,,30,100
";

/// Which built-in table to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableShape {
    #[default]
    Scalar,
    Range,
}

impl TableShape {
    pub fn csv(self) -> &'static str {
        match self {
            TableShape::Scalar => SCALAR_TABLE,
            TableShape::Range => RANGE_TABLE,
        }
    }
}

/// An in-memory store over one of the built-in tables.
pub fn sample_store(shape: TableShape, settings: StoreSettings) -> HarnessResult<MaterialStore> {
    MaterialStore::from_reader(shape.csv().as_bytes(), settings)
}
