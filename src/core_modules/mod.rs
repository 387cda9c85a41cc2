pub mod actuator_dispatcher;
pub mod background_model;
pub mod bearing_mapper;
pub mod foreground_refiner;
pub mod overlay;
pub mod region_aggregator;
pub mod resource_governor;
pub mod utils;
