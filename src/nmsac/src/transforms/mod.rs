//! Rigid transforms: representation, SVD fitting and ICP refinement.

pub mod icp;
pub mod svd;
pub mod types;

pub use icp::{iterative_closest_point, IcpConfig, IcpRefiner, IcpResult, IcpStatus};
pub use svd::best_fit_transform;
pub use types::RigidTransform;
