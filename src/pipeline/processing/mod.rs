// Pipeline processing: cleaning, enrichment, validation and threat monitoring

pub mod clean;
pub mod monitor;
pub mod transform;
pub mod validate;

pub use clean::Cleaner;
pub use monitor::Monitor;
pub use transform::Transformer;
pub use validate::Validator;
