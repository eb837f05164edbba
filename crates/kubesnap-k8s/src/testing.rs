//! Scripted command runner for aggregator tests

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use kubesnap_exec::{CancellationToken, CommandRunner, ExecError, Invocation, Tool};

use crate::cache::{Clock, ManualClock};
use crate::client::KubeClient;
use crate::config::ClientConfig;

#[derive(Default)]
struct Script {
    rules: Vec<(String, Result<String, ExecError>)>,
    calls: Vec<Vec<String>>,
    envs: Vec<BTreeMap<String, String>>,
    attempt_limits: Vec<Option<u32>>,
}

/// Answers each invocation with the first rule whose pattern occurs in the
/// space-joined arguments. Unmatched invocations fail.
#[derive(Clone, Default)]
pub(crate) struct ScriptedRunner {
    script: Arc<Mutex<Script>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, pattern: &str, stdout: &str) -> Self {
        self.script
            .lock()
            .rules
            .push((pattern.to_string(), Ok(stdout.to_string())));
        self
    }

    pub fn fail(self, pattern: &str, err: ExecError) -> Self {
        self.script.lock().rules.push((pattern.to_string(), Err(err)));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.script.lock().calls.clone()
    }

    pub fn envs(&self) -> Vec<BTreeMap<String, String>> {
        self.script.lock().envs.clone()
    }

    /// Policy override of each call, as its attempt limit
    pub fn attempt_limits(&self) -> Vec<Option<u32>> {
        self.script.lock().attempt_limits.clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled { output: None });
        }

        let joined = invocation.get_args().join(" ");
        let mut script = self.script.lock();
        script.calls.push(invocation.get_args().to_vec());
        script.envs.push(invocation.get_env().clone());
        script
            .attempt_limits
            .push(invocation.policy().map(|p| p.max_attempts));

        let rule = script
            .rules
            .iter()
            .find(|(pattern, _)| joined.contains(pattern.as_str()));
        match rule {
            Some((_, Ok(stdout))) => Ok(stdout.clone().into_bytes()),
            Some((_, Err(err))) => Err(err.clone()),
            None => Err(ExecError::failed(format!(
                "no scripted response for {}",
                invocation.display()
            ))),
        }
    }
}

pub(crate) fn client_with_parts(
    runner: ScriptedRunner,
    config: &ClientConfig,
    kubectl: Tool,
    helm: Tool,
    clock: Arc<dyn Clock>,
) -> KubeClient {
    KubeClient::from_parts(config, Arc::new(runner), kubectl, helm, clock)
}

pub(crate) fn client_with(runner: ScriptedRunner) -> KubeClient {
    client_with_config(runner, &ClientConfig::default())
}

pub(crate) fn client_with_config(runner: ScriptedRunner, config: &ClientConfig) -> KubeClient {
    client_with_parts(
        runner,
        config,
        Tool::at("kubectl", "/usr/bin/kubectl"),
        Tool::at("helm", "/usr/bin/helm"),
        Arc::new(ManualClock::new()),
    )
}

pub(crate) fn client_with_tools(runner: ScriptedRunner, kubectl: Tool, helm: Tool) -> KubeClient {
    client_with_parts(
        runner,
        &ClientConfig::default(),
        kubectl,
        helm,
        Arc::new(ManualClock::new()),
    )
}

pub(crate) fn client_with_clock(runner: ScriptedRunner, clock: Arc<ManualClock>) -> KubeClient {
    client_with_parts(
        runner,
        &ClientConfig::default(),
        Tool::at("kubectl", "/usr/bin/kubectl"),
        Tool::at("helm", "/usr/bin/helm"),
        clock,
    )
}
