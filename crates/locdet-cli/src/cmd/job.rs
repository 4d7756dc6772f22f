use crate::output::{print_json, print_table};
use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use clap::Subcommand;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Subcommand definition
// ---------------------------------------------------------------------------

#[derive(Subcommand, Debug)]
pub enum JobSubcommand {
    /// Upload a blueprint and create a detection job
    Submit {
        /// Blueprint file (png, jpg, or pdf)
        file: PathBuf,
        /// File format (default: inferred from the extension)
        #[arg(long)]
        format: Option<String>,
        /// Start the full pipeline immediately after upload
        #[arg(long)]
        process: bool,
        /// Server base URL
        #[arg(long, default_value = "http://localhost:8080", env = "LOCDET_SERVER")]
        server: String,
    },
    /// Show a job's status
    Status {
        job_id: String,
        #[arg(long, default_value = "http://localhost:8080", env = "LOCDET_SERVER")]
        server: String,
    },
    /// Cancel a pending or processing job
    Cancel {
        job_id: String,
        #[arg(long, default_value = "http://localhost:8080", env = "LOCDET_SERVER")]
        server: String,
    },
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn run(subcommand: JobSubcommand, json: bool) -> Result<()> {
    match subcommand {
        JobSubcommand::Submit {
            file,
            format,
            process,
            server,
        } => run_submit(&file, format.as_deref(), process, &server, json),
        JobSubcommand::Status { job_id, server } => run_status(&job_id, &server, json),
        JobSubcommand::Cancel { job_id, server } => run_cancel(&job_id, &server, json),
    }
}

// ---------------------------------------------------------------------------
// submit
// ---------------------------------------------------------------------------

fn run_submit(
    file: &PathBuf,
    format: Option<&str>,
    process: bool,
    server: &str,
    json: bool,
) -> Result<()> {
    let format = match format {
        Some(f) => f.to_string(),
        None => file
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| anyhow!("cannot infer format from '{}', pass --format", file.display()))?,
    };
    let content = std::fs::read(file)
        .with_context(|| format!("failed to read blueprint '{}'", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string);

    let body = serde_json::json!({
        "blueprint": {
            "file": base64::engine::general_purpose::STANDARD.encode(&content),
            "format": format,
            "filename": filename,
        }
    });
    let data = call(server, "POST", "/api/v1/jobs", Some(&body))?;
    let job_id = data["job_id"]
        .as_str()
        .ok_or_else(|| anyhow!("server response missing job_id"))?
        .to_string();

    if process {
        call(server, "POST", &format!("/api/v1/jobs/{job_id}/process"), None)?;
    }

    if json {
        return print_json(&data);
    }
    println!("Created job {job_id}");
    if process {
        println!("Pipeline started; poll with `locdet job status {job_id}`");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// status / cancel
// ---------------------------------------------------------------------------

fn run_status(job_id: &str, server: &str, json: bool) -> Result<()> {
    let data = call(server, "GET", &format!("/api/v1/jobs/{job_id}"), None)?;
    if json {
        return print_json(&data);
    }
    print_table(
        &["FIELD", "VALUE"],
        vec![
            vec!["job_id".into(), str_field(&data, "job_id")],
            vec!["status".into(), str_field(&data, "status")],
            vec!["format".into(), str_field(&data, "blueprint_format")],
            vec!["created_at".into(), str_field(&data, "created_at")],
            vec!["updated_at".into(), str_field(&data, "updated_at")],
            vec!["result_key".into(), str_field(&data, "result_key")],
        ],
    );
    Ok(())
}

fn run_cancel(job_id: &str, server: &str, json: bool) -> Result<()> {
    let data = call(server, "DELETE", &format!("/api/v1/jobs/{job_id}"), None)?;
    if json {
        return print_json(&data);
    }
    println!("Cancelled job {job_id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// HTTP plumbing
// ---------------------------------------------------------------------------

fn str_field(data: &serde_json::Value, key: &str) -> String {
    data[key].as_str().unwrap_or("-").to_string()
}

/// Call the server and unwrap the `data` of the response envelope, turning
/// error envelopes into readable errors.
fn call(
    server: &str,
    method: &str,
    path: &str,
    body: Option<&serde_json::Value>,
) -> Result<serde_json::Value> {
    let url = format!("{}{}", server.trim_end_matches('/'), path);
    let request = ureq::request(method, &url).set("content-type", "application/json");
    let response = match body {
        Some(json) => request.send_string(&json.to_string()),
        None => request.call(),
    };

    let text = match response {
        Ok(resp) => resp.into_string()?,
        Err(ureq::Error::Status(code, resp)) => {
            let text = resp.into_string().unwrap_or_default();
            let envelope: serde_json::Value =
                serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
            let message = envelope["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            let error_code = envelope["error"]["code"].as_str().unwrap_or("").to_string();
            return Err(anyhow!("server returned {code} {error_code}: {message}"));
        }
        Err(err) => return Err(anyhow!("request to {url} failed: {err}")),
    };

    let envelope: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("invalid JSON from {url}"))?;
    Ok(envelope["data"].clone())
}
