pub mod deploy;
pub mod start;
pub mod status;
pub mod stop;
