// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Operation inputs.

use std::collections::HashMap;

use crate::error::{CepError, Result};

/// Name of the operation to run.
pub const OPERATION: &str = "CERTMONGER_OPERATION";

/// PEM certificate signing request.
pub const CSR: &str = "CERTMONGER_CSR";

/// PEM certificate being renewed.
pub const CERTIFICATE: &str = "CERTMONGER_CERTIFICATE";

/// Requested template.
pub const CA_PROFILE: &str = "CERTMONGER_CA_PROFILE";

/// Cookie returned with a pending result.
pub const CA_COOKIE: &str = "CERTMONGER_CA_COOKIE";

const KEYS: [&str; 5] = [OPERATION, CSR, CERTIFICATE, CA_PROFILE, CA_COOKIE];

/// Named inputs for one operation.
///
/// Blank values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationEnv {
    vars: HashMap<String, String>,
}

impl OperationEnv {
    /// An empty set of inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the certmonger variables from the process environment.
    pub fn from_process() -> Self {
        let mut env = Self::new();
        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                env.set(key, value);
            }
        }
        env
    }

    /// Add an input.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set an input.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Look up an input.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Look up an input that must be present.
    ///
    /// # Errors
    ///
    /// [`CepError::Underconfigured`] if the input is missing or blank.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| CepError::underconfigured(format!("{} is not set", key)))
    }

    /// The requested operation name.
    pub fn operation(&self) -> Option<&str> {
        self.get(OPERATION)
    }
}
