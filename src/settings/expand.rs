// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Variable expansion for settings values.
//!
//! This module handles expansion of variables like `${hostname}` and
//! `${FQDN}` in settings strings.

/// Host name variables in both casings.
const HOST_VARIABLES: [&str; 6] = [
    "hostname",
    "HOSTNAME",
    "fqdn",
    "FQDN",
    "shortname",
    "SHORTNAME",
];

/// Expand variables in a string.
///
/// Variables are in the format `${NAME}`. Supported variables:
///
/// - `${hostname}`, `${HOSTNAME}` - host name
/// - `${fqdn}`, `${FQDN}` - fully qualified host name
/// - `${shortname}`, `${SHORTNAME}` - first label of the host name
///
/// Lowercase names expand lowercased and uppercase names uppercased. Any
/// other name is read from the environment. Unknown variables are left
/// unchanged.
///
/// # Examples
///
/// ```
/// use usg_cep_client::settings::expand_variables;
///
/// let endpoint = expand_variables("https://${fqdn}/ADPolicyProvider_CEP_Kerberos/service.svc/CEP");
/// assert!(!endpoint.contains("${fqdn}"));
/// ```
pub fn expand_variables(input: &str) -> String {
    let host = host_name();
    expand_with(input, |name| {
        if HOST_VARIABLES.contains(&name) {
            host.as_deref().map(|h| host_variable(name, h))
        } else {
            std::env::var(name).ok()
        }
    })
}

/// Expand `${NAME}` references using `lookup`.
pub(crate) fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = input.to_string();
    let mut start = 0;

    while let Some(var_start) = result[start..].find("${") {
        let absolute_start = start + var_start;

        if let Some(var_end) = result[absolute_start..].find('}') {
            let absolute_end = absolute_start + var_end;
            let var_name = &result[absolute_start + 2..absolute_end];

            if let Some(value) = lookup(var_name) {
                result.replace_range(absolute_start..absolute_end + 1, &value);
                // Expanded text is not expanded again.
                start = absolute_start + value.len();
            } else {
                start = absolute_end + 1;
            }
        } else {
            start = absolute_start + 2;
        }
    }

    result
}

/// Value of one of [`HOST_VARIABLES`] for the host name `host`.
fn host_variable(name: &str, host: &str) -> String {
    let value = match name.to_ascii_lowercase().as_str() {
        "shortname" => host.split('.').next().unwrap_or(host),
        _ => host,
    };
    if name.chars().all(|c| c.is_ascii_uppercase()) {
        value.to_uppercase()
    } else {
        value.to_lowercase()
    }
}

fn host_name() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}
