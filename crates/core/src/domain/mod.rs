pub mod observation;
pub mod source;
