// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::Result;
use crate::process::{run_checked, DOCKER_TIMEOUT_SECS};

/// Read-only view of the container runtime used by diagnostics.
pub trait ContainerRuntime {
    /// Names of running containers.
    fn running_containers(&self) -> Result<Vec<String>>;

    /// `ls -l` of a directory inside a running container.
    fn list_dir(&self, container: &str, dir: &str) -> Result<String>;
}

/// Talks to the `docker` CLI.
pub struct DockerCli {
    program: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ContainerRuntime for DockerCli {
    fn running_containers(&self) -> Result<Vec<String>> {
        let stdout = run_checked(
            &self.program,
            &["ps", "--format", "{{.Names}}"],
            DOCKER_TIMEOUT_SECS,
        )?;
        Ok(parse_names(&stdout))
    }

    fn list_dir(&self, container: &str, dir: &str) -> Result<String> {
        run_checked(
            &self.program,
            &["exec", container, "ls", "-l", dir],
            DOCKER_TIMEOUT_SECS,
        )
    }
}

fn parse_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
