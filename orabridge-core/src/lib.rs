pub mod data;
pub mod err;
pub mod sqlil;
