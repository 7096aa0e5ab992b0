// Routing core - allocation, permission and path state shared by every backend

mod controls;
pub mod driver;
pub mod engine;
pub mod matrix;
pub mod pcm;
pub mod permission;
pub mod pool;

pub use driver::{PathDriver, Programmed, Route, RouteKind};
pub use engine::{PathState, RoutingManager, RoutingSnapshot};
pub use matrix::{ConnectionMatrix, PhysicalInterface};
pub use pcm::{Companding, PcmMode, PcmSettings};
pub use permission::{AlwaysAllow, DeferredRelease, PermissionCoordinator, SyncAuthority};
pub use pool::{scan_order, DevicePool, MultimediaDevice, ScanRole};
