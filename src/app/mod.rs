pub mod ports;
pub mod pipeline_use_case;
