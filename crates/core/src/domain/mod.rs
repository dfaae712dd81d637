pub mod contract;
pub mod subscription;
