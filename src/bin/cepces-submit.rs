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

//! certmonger CA helper.
//!
//! certmonger runs the helper once per operation, with the operation name in
//! `CERTMONGER_OPERATION` and its inputs in other `CERTMONGER_*` variables.
//! The payload is written to stdout and the result code is the exit status.
//!
//! # Usage
//!
//! ```text
//! cepces-submit [OPTIONS]
//!
//! Options:
//!   -c, --config <PATH>            Path to the settings file [env: CEPCES_CONFIG]
//!   -s, --server <URL>             Override the policy or enrollment endpoint
//!   -a, --auth <KIND>              Override the authentication mechanism
//!   -k, --keytab <PATH>            Kerberos keytab
//!   -p, --principals <LIST>        Kerberos principals, comma separated
//!   -T, --poll-interval <SECONDS>  Seconds certmonger waits before polling
//!   -l, --log-level <LEVEL>        error, warn, info, debug or trace
//!   -h, --help                     Print help
//!   -V, --version                  Print version
//! ```
//!
//! # Registering with certmonger
//!
//! ```bash
//! getcert add-ca -c cepces -e '/usr/libexec/certmonger/cepces-submit --server=https://ca.ad.example.test/ADPolicyProvider_CEP_Kerberos/service.svc/CEP'
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use usg_cep_client::logging::{self, LogLevel};
use usg_cep_client::operations::env::OPERATION;
use usg_cep_client::settings::{Settings, SettingsLoader};
use usg_cep_client::{Dispatcher, Operation, OperationEnv, OperationResult, Result, ResultCode};

/// certmonger helper for MS-XCEP / MS-WSTEP certificate enrollment
#[derive(Parser, Debug)]
#[command(name = "cepces-submit")]
#[command(author = "U.S. Federal Government")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "certmonger helper for Microsoft certificate enrollment web services", long_about = None)]
struct Cli {
    /// Path to the settings file
    #[arg(short, long, env = "CEPCES_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the policy or enrollment endpoint
    #[arg(short, long, value_name = "URL")]
    server: Option<String>,

    /// Override the authentication mechanism
    #[arg(short, long, value_name = "KIND")]
    auth: Option<String>,

    /// Kerberos keytab
    #[arg(short, long, value_name = "PATH")]
    keytab: Option<PathBuf>,

    /// Kerberos principals, comma separated
    #[arg(short, long, value_name = "LIST", value_delimiter = ',')]
    principals: Vec<String>,

    /// Seconds certmonger waits before polling a pending request
    #[arg(short = 'T', long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// error, warn, info, debug or trace
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = load_settings(&cli);

    let level = cli
        .log_level
        .or_else(|| {
            settings
                .as_ref()
                .ok()
                .and_then(|s| s.logging.level.as_deref())
                .and_then(LogLevel::parse)
        })
        .unwrap_or_default();
    logging::init(level);

    let env = OperationEnv::from_process();
    let result = run(settings, &env);

    if !result.payload.is_empty() {
        println!("{}", result.payload);
    }
    ExitCode::from(result.code.code() as u8)
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut loader = SettingsLoader::new();
    if let Some(ref path) = cli.config {
        loader = loader.with_path(path);
    }
    let mut settings = loader.load()?;

    if let Some(ref server) = cli.server {
        settings.global.endpoint = Some(server.clone());
    }
    if let Some(ref auth) = cli.auth {
        settings.global.auth = auth.clone();
    }
    if let Some(ref keytab) = cli.keytab {
        settings.kerberos.keytab = Some(keytab.clone());
    }
    if !cli.principals.is_empty() {
        settings.kerberos.principals = cli.principals.clone();
    }
    if let Some(poll_interval) = cli.poll_interval {
        settings.global.poll_interval = poll_interval;
    }

    Ok(settings)
}

fn run(settings: Result<Settings>, env: &OperationEnv) -> OperationResult {
    let Some(name) = env.operation() else {
        tracing::error!("{} is not set", OPERATION);
        return OperationResult::new(ResultCode::Unsupported, "");
    };
    let operation = match name.parse::<Operation>() {
        Ok(operation) => operation,
        Err(e) => {
            tracing::info!("{}", e);
            return OperationResult::new(ResultCode::Unsupported, "");
        }
    };

    // Static operations must work before the helper is configured.
    let dispatcher = match settings.and_then(|s| s.to_client_config()) {
        Ok(config) => Dispatcher::new(config),
        Err(e) if operation.needs_service() => {
            tracing::error!("{}", e);
            Dispatcher::unconfigured(e.to_string())
        }
        Err(e) => {
            tracing::debug!("Running {} without a configuration: {}", operation, e);
            Dispatcher::unconfigured(e.to_string())
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create async runtime: {}", e);
            return OperationResult::new(ResultCode::Underconfigured, e.to_string());
        }
    };

    runtime.block_on(dispatcher.dispatch(operation.name(), env))
}
