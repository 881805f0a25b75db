pub mod lookup;
pub mod output;
