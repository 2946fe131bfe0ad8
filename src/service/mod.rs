pub mod garbage;
pub mod manifest;
pub mod proxy;
pub mod status;
