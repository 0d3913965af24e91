pub mod cni;
pub mod crd;
pub mod helpers;
pub mod ipam;
pub mod kubernetes;
pub mod translate;
