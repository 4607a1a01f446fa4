//! Runner for the convert operation
//!
//! Resolves the container, password and output location, runs the
//! converter, writes the artifacts and reports what happened.

use crate::cert_ops::reader::{self, DetectedFormat, MAX_CONTAINER_BYTES};
use crate::cert_ops::writer::{self, OutputPlan, WrittenArtifact};
use crate::cert_ops::CredentialBundle;
use crate::cli::{interactive, Cli};
use crate::config::Settings;
use crate::utils::progress::{create_spinner, print_info, print_pass, print_warning};
use crate::utils::{CertFileError, ConvertError, ToolkitError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroizing;

/// How a run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Converted,
    Cancelled,
}

#[derive(Serialize)]
struct ConversionSummary<'a> {
    status: &'static str,
    container: &'a Path,
    output_dir: &'a Path,
    key_algorithm: &'a str,
    leaf_subject: &'a str,
    chain_certificates: usize,
    artifacts: &'a [WrittenArtifact],
}

#[derive(Serialize)]
struct FailureSummary<'a> {
    status: &'static str,
    container: &'a Path,
    kind: &'static str,
    message: String,
}

/// Convert one container into three PEM files
pub fn run_convert(cli: &Cli, settings: &Settings) -> Result<RunOutcome, anyhow::Error> {
    let Some(container) = resolve_container(cli, settings)? else {
        return Ok(RunOutcome::Cancelled);
    };

    let data = reader::read_container(&container, MAX_CONTAINER_BYTES)?;
    let format = reader::detect_format_from_bytes(&data);
    debug!(path = %container.display(), bytes = data.len(), %format, "container read");

    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| writer::default_output_dir(&container, &settings.output.dir_suffix));
    let plan = OutputPlan::new(output_dir, &settings.output);
    plan.check_collisions(cli.force)?;

    let Some(password) = resolve_password(cli, &container)? else {
        return Ok(RunOutcome::Cancelled);
    };

    let spinner = (!cli.json).then(|| create_spinner("Decrypting container..."));
    let result = writer::convert_to_files(&data, &password, &plan, cli.force);
    drop(password);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let (bundle, written) = match result {
        Ok(converted) => converted,
        Err(ToolkitError::Convert(err)) => {
            return Err(report_failure(cli, &container, format, err))
        }
        Err(err) => return Err(err.into()),
    };

    if cli.json {
        let summary = ConversionSummary {
            status: "ok",
            container: &container,
            output_dir: &plan.dir,
            key_algorithm: bundle.key_algorithm(),
            leaf_subject: bundle.leaf_subject(),
            chain_certificates: bundle.chain_len(),
            artifacts: &written,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_written(&bundle, &plan);
    }

    Ok(RunOutcome::Converted)
}

/// An explicit path wins; otherwise discover in `--dir`.
fn resolve_container(cli: &Cli, settings: &Settings) -> Result<Option<PathBuf>, anyhow::Error> {
    if let Some(path) = &cli.container {
        return Ok(Some(path.clone()));
    }

    let extensions = &settings.discovery.extensions;
    let mut found = reader::discover_containers(&cli.dir, extensions)?;
    match found.len() {
        0 => Err(CertFileError::NoContainerFound {
            dir: cli.dir.display().to_string(),
            extensions: extensions.join(", "),
        }
        .into()),
        1 => {
            let path = found.remove(0);
            if !cli.json {
                print_info(&format!("Using container {}", path.display()));
            }
            Ok(Some(path))
        }
        count => {
            if !console::Term::stderr().is_term() {
                anyhow::bail!(
                    "{} containers found in {}; pass the one to convert as an argument",
                    count,
                    cli.dir.display()
                );
            }
            Ok(interactive::select_container(&found)?)
        }
    }
}

/// `--password-env` when given, else a hidden prompt. Empty passwords are refused.
fn resolve_password(
    cli: &Cli,
    container: &Path,
) -> Result<Option<Zeroizing<String>>, anyhow::Error> {
    let password = match &cli.password_env {
        Some(name) => password_from_env(name, std::env::var(name))?,
        None => {
            if !console::Term::stderr().is_term() {
                anyhow::bail!(
                    "No terminal for the password prompt (use --password-env)"
                );
            }
            match interactive::prompt_password(container)? {
                Some(password) => Zeroizing::new(password),
                None => return Ok(None),
            }
        }
    };

    if password.is_empty() {
        return Err(CertFileError::EmptyPassword.into());
    }
    Ok(Some(password))
}

fn password_from_env(
    name: &str,
    value: Result<String, std::env::VarError>,
) -> Result<Zeroizing<String>, CertFileError> {
    match value {
        Ok(password) => Ok(Zeroizing::new(password)),
        Err(std::env::VarError::NotPresent) => Err(CertFileError::PasswordEnvMissing {
            name: name.to_string(),
        }),
        Err(std::env::VarError::NotUnicode(_)) => Err(CertFileError::PasswordEnvNotUnicode {
            name: name.to_string(),
        }),
    }
}

fn report_failure(
    cli: &Cli,
    container: &Path,
    format: DetectedFormat,
    err: ConvertError,
) -> anyhow::Error {
    if cli.json {
        let summary = FailureSummary {
            status: "error",
            container,
            kind: err.kind(),
            message: err.user_message(),
        };
        if let Ok(text) = serde_json::to_string_pretty(&summary) {
            println!("{}", text);
        }
    } else if matches!(err, ConvertError::MalformedContainer { .. })
        && format != DetectedFormat::Pkcs12
    {
        print_warning(&format!(
            "{} does not look like a PKCS#12 container (detected: {})",
            container.display(),
            format
        ));
    }
    err.into()
}

fn print_written(bundle: &CredentialBundle, plan: &OutputPlan) {
    print_info(&format!(
        "Leaf certificate: {} ({})",
        bundle.leaf_subject(),
        bundle.key_algorithm()
    ));
    print_pass(&format!("Private key saved to {}", plan.key.display()));
    print_pass(&format!("Certificate saved to {}", plan.cert.display()));
    if bundle.chain_len() > 0 {
        print_pass(&format!(
            "Certificate chain saved to {} ({} certificates)",
            plan.chain.display(),
            bundle.chain_len()
        ));
    } else {
        print_warning(&format!(
            "No intermediate chain found; wrote empty {}",
            plan.chain.display()
        ));
    }
}
