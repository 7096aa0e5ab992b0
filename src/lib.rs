// Audio DSP routing resource manager
//
// This crate time-multiplexes the small fixed pool of shared DSP multimedia
// channels across the logical audio streams of the modem platform adaptor:
// - stream: logical streams, their private parameter blocks and the registry
// - routing: connection matrix, device pool, permission coordinator and the
//   path set/reset engine
// - backend: hardware path drivers (ALSA mixer strings or QMI media messages)
// - swisync: wire protocol, client and listener for the synchronization authority
// - service: async wrapper providing the single mutual-exclusion domain

pub mod backend;
pub mod config;
pub mod error;
pub mod log;
pub mod routing;
pub mod service;
pub mod stream;
pub mod swisync;

pub use config::{BackendKind, BackhaulNames, CodecWiring, RoutingConfig, SlotConfig, SwisyncConfig};
pub use error::{LeResult, Result, RoutingError};
pub use routing::{
    ConnectionMatrix, DevicePool, PathDriver, PathState, PermissionCoordinator, PhysicalInterface,
    Programmed, Route, RouteKind, RoutingManager, RoutingSnapshot, SyncAuthority,
};
pub use service::RoutingService;
pub use stream::{AudioInterface, Half, InterfaceFamily, StreamId};
