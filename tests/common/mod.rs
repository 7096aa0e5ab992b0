// Scripted fakes shared by the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use pa_audio_routing::backend::{LoopbackQmiService, QmiAudioService};
use pa_audio_routing::routing::{PathDriver, Programmed, Route, RouteKind, SyncAuthority};
use pa_audio_routing::swisync::{SyncOperation, SyncRequest};
use pa_audio_routing::{RoutingConfig, RoutingManager};

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Initialize,
    Program(Route),
    Unprogram(Route),
}

#[derive(Debug, Default)]
struct DriverState {
    calls: Vec<DriverCall>,
    fail_program: bool,
    fail_unprogram: bool,
}

/// Path driver recording every hardware command
#[derive(Clone, Default)]
pub struct RecordingDriver {
    state: Arc<Mutex<DriverState>>,
}

impl RecordingDriver {
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of program/unprogram commands issued
    pub fn command_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, DriverCall::Initialize))
            .count()
    }

    pub fn unprogram_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, DriverCall::Unprogram(_)))
            .count()
    }

    pub fn last(&self) -> Option<DriverCall> {
        self.calls().last().cloned()
    }

    pub fn fail_program(&self, fail: bool) {
        self.state.lock().unwrap().fail_program = fail;
    }

    pub fn fail_unprogram(&self, fail: bool) {
        self.state.lock().unwrap().fail_unprogram = fail;
    }
}

impl PathDriver for RecordingDriver {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn initialize(&mut self) -> anyhow::Result<()> {
        self.state.lock().unwrap().calls.push(DriverCall::Initialize);
        Ok(())
    }

    fn program(&mut self, route: &Route) -> anyhow::Result<Programmed> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DriverCall::Program(route.clone()));
        if state.fail_program {
            anyhow::bail!("mixer rejected {:?}", route.kind);
        }
        Ok(Programmed {
            hw_device_id: route.binding.as_ref().map(|b| b.pcm_device as u32),
            front_end_hw_id: None,
        })
    }

    fn unprogram(&mut self, route: &Route) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DriverCall::Unprogram(route.clone()));
        if state.fail_unprogram {
            anyhow::bail!("mixer rejected reset of {:?}", route.kind);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AuthorityState {
    answers: VecDeque<Result<bool, String>>,
    requests: Vec<SyncRequest>,
    registrations: Vec<String>,
}

/// Authority answering from a script; allows once the script runs out
#[derive(Clone, Default)]
pub struct ScriptedAuthority {
    state: Arc<Mutex<AuthorityState>>,
}

impl ScriptedAuthority {
    pub fn answer(&self, allowed: bool) -> &Self {
        self.state.lock().unwrap().answers.push_back(Ok(allowed));
        self
    }

    pub fn fail(&self, reason: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .answers
            .push_back(Err(reason.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<SyncRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn operations(&self) -> Vec<SyncOperation> {
        self.requests().iter().map(|r| r.operation).collect()
    }

    pub fn registrations(&self) -> Vec<String> {
        self.state.lock().unwrap().registrations.clone()
    }
}

impl SyncAuthority for ScriptedAuthority {
    fn request(&self, request: &SyncRequest) -> anyhow::Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(*request);
        match state.answers.pop_front() {
            Some(Ok(allowed)) => Ok(allowed),
            Some(Err(reason)) => Err(anyhow::anyhow!(reason)),
            None => Ok(true),
        }
    }

    fn register(&self, notify_socket: &str) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .registrations
            .push(notify_socket.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub manager: RoutingManager,
    pub driver: RecordingDriver,
    pub authority: ScriptedAuthority,
    pub audio: Arc<LoopbackQmiService>,
}

impl Harness {
    pub fn with_config(config: RoutingConfig) -> Self {
        let driver = RecordingDriver::default();
        let authority = ScriptedAuthority::default();
        let audio = Arc::new(LoopbackQmiService::new(config.default_profile));
        let service: Arc<dyn QmiAudioService> = audio.clone();
        let mut manager = RoutingManager::new(
            &config,
            Box::new(driver.clone()),
            service,
            Box::new(authority.clone()),
        );
        manager.initialize().expect("manager should initialize");
        Self {
            manager,
            driver,
            authority,
            audio,
        }
    }

    pub fn new() -> Self {
        Self::with_config(RoutingConfig::default())
    }
}

pub fn programmed_kinds(calls: &[DriverCall]) -> Vec<RouteKind> {
    calls
        .iter()
        .filter_map(|c| match c {
            DriverCall::Program(route) => Some(route.kind),
            _ => None,
        })
        .collect()
}
