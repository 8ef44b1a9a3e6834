//! Rigid 3-D point-set registration by non-minimal sample consensus.
//!
//! Two point clouds are registered without an initial guess and without
//! known correspondences. Small samples of both clouds are matched by a
//! correspondence solver, a rigid transform is fitted to the matches and
//! refined with ICP, and the transform with the largest inlier set wins.
//!
//! # Architecture
//!
//! - [`correspondences`]: pairwise consistency, the maximum clique solver
//!   and the relaxed quadratic assignment solver
//! - [`transforms`]: rigid transforms, the SVD fitter and ICP
//! - [`consensus`]: the sampling loop with its adaptive stopping bound
//! - [`config`]: settings and their JSON form
//!
//! # Usage
//!
//! ```ignore
//! use nmsac::{Nmsac, NmsacConfig};
//!
//! let config = NmsacConfig::from_file("nmsac.json")?;
//! let nmsac = Nmsac::with_config(config)?;
//!
//! let result = nmsac.register(&source_points, &target_points)?;
//! if result.success {
//!     println!("R = {}, t = {}", result.rotation, result.translation);
//! }
//! ```

pub mod config;
pub mod consensus;
pub mod correspondences;
pub mod error;
pub mod point_cloud;
pub mod registration;
pub mod search;
pub mod test_utils;
pub mod transforms;

pub use config::NmsacConfig;
pub use consensus::{
    adaptive_trial_bound, count_inliers, register, register_batch, register_clouds,
    register_with_debug, RegistrationDebug, RegistrationResult, TrialDebug, TrialOutcome,
};
pub use correspondences::{
    CorrespondenceConfig, CorrespondenceSolver, Correspondences, MaxCliqueAlgorithm,
    MaxCliqueSolver, McConfig, QapConfig, QapSolver, UndirectedGraph,
};
pub use error::{ConfigError, FitError, GraphError, IcpError, PointCloudError, SolverFailure};
pub use point_cloud::PointCloud;
pub use search::NearestNeighborSearch;
pub use transforms::{
    best_fit_transform, iterative_closest_point, IcpConfig, IcpRefiner, IcpResult, IcpStatus,
    RigidTransform,
};

// High-level API (recommended for most users)
pub use registration::{Nmsac, NmsacBuilder};
