pub mod forecast_table;
pub mod registry;
