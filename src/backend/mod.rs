// Hardware path drivers

pub mod amix;
pub mod mixer;
pub mod qmi;

pub use amix::AmixPathDriver;
pub use mixer::{AmixerGateway, MixerGateway};
pub use qmi::{
    AvConfigRequest, LoopbackQmiService, OperateType, QmiAudioService, QmiPathDriver, QmiRequest, REQUEST_HISTORY,
};
