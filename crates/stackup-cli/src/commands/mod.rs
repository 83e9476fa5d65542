pub mod logs;
pub mod plan;
pub mod status;
pub mod stop;
pub mod up;
