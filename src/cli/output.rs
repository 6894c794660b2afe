//! Output formatting for CLI commands.
//!
//! Every formatter returns a string; `main` decides where it goes.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::api::Image;
use crate::config::ValidationResult;
use crate::planner::{ChangePlan, DiffType};
use crate::reconciler::{ApplyReport, ResourceOutcome};
use crate::resource::Diagnostics;
use crate::state::ProviderState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Planned change row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Calls")]
    calls: String,
}

/// Outcome row for table display.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Result")]
    result: String,
}

/// Tracked server row.
#[derive(Tabled)]
struct ServerRow {
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Applied")]
    applied_at: String,
}

/// Tracked attachment row.
#[derive(Tabled)]
struct AttachmentRow {
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Volume")]
    volume_id: String,
    #[tabled(rename = "Server")]
    server_id: String,
}

/// Image listing row.
#[derive(Tabled)]
struct ImageRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    image_type: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true when output is JSON.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Formats the outcome of manifest validation.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "diagnostics": Diagnostics::from(result),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Manifest is valid", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Manifest is invalid:", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {}: {}", error.field, error.message);
                    }
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats a change plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &ChangePlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &ChangePlan) -> String {
        if plan.is_empty() {
            return format!("{} No changes required - everything matches the manifest.\n", "✓".green());
        }

        let mut output = String::new();
        let _ = write!(output, "\nPlan\n");
        let _ = write!(output, "   Manifest hash: {}\n\n", Self::short_hash(&plan.manifest_hash));

        let rows: Vec<PlanRow> = plan
            .changes
            .iter()
            .enumerate()
            .map(|(i, change)| PlanRow {
                index: i + 1,
                action: Self::format_diff_type(change.diff.diff_type),
                resource: change.diff.address.clone(),
                calls: if change.calls.is_empty() {
                    String::from("-")
                } else {
                    change.calls.join("\n")
                },
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let count = |kind: DiffType| plan.changes.iter().filter(|c| c.diff.diff_type == kind).count();
        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to replace, {} to delete ({} calls)\n",
            count(DiffType::Create).to_string().green(),
            count(DiffType::Update).to_string().yellow(),
            count(DiffType::Replace).to_string().yellow(),
            count(DiffType::Delete).to_string().red(),
            plan.call_count()
        );
        output
    }

    /// Formats the report of an apply or destroy run.
    #[must_use]
    pub fn format_report(&self, report: &ApplyReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.outcomes.is_empty() {
                    return format!("{} No changes applied\n", "✓".green());
                }

                let rows: Vec<OutcomeRow> = report.outcomes.iter().map(Self::outcome_row).collect();
                let mut output = Table::new(rows).to_string();
                output.push_str("\n\n");

                let status = if report.is_success() {
                    format!("{} {report}", "✓".green())
                } else {
                    format!("{} {report}", "✗".red())
                };
                output.push_str(&status);
                output.push('\n');

                Self::write_diagnostics(&mut output, report.outcomes.iter());
                output
            }
        }
    }

    /// Formats the outcome of a single resource operation.
    #[must_use]
    pub fn format_outcome(&self, outcome: &ResourceOutcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = if outcome.diagnostics.has_errors() {
                    format!("{} {}: {} failed\n", "✗".red(), outcome.address, outcome.operation)
                } else {
                    format!("{} {}: {}\n", "✓".green(), outcome.address, outcome.operation)
                };
                Self::write_diagnostics(&mut output, std::iter::once(outcome));
                output
            }
        }
    }

    /// Formats tracked state.
    #[must_use]
    pub fn format_state(&self, state: &ProviderState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "\nState v{}", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated.format("%Y-%m-%d %H:%M:%S"));

                if state.is_empty() {
                    output.push_str("   Nothing tracked.\n");
                    return output;
                }

                if !state.servers.is_empty() {
                    let rows: Vec<ServerRow> = state
                        .servers
                        .values()
                        .map(|s| ServerRow {
                            region: s.config.region.clone(),
                            id: s.config.id.clone(),
                            name: s.config.name.clone().unwrap_or_else(|| String::from("-")),
                            image: s.image_id.clone().unwrap_or_else(|| String::from("-")),
                            applied_at: s.applied_at.format("%Y-%m-%d %H:%M").to_string(),
                        })
                        .collect();
                    let _ = write!(output, "\nServers ({}):\n{}\n", rows.len(), Table::new(rows));
                }

                if !state.attachments.is_empty() {
                    let rows: Vec<AttachmentRow> = state
                        .attachments
                        .values()
                        .map(|a| AttachmentRow {
                            region: a.region.clone(),
                            volume_id: a.volume_id.clone(),
                            server_id: a.server_id.clone(),
                        })
                        .collect();
                    let _ = write!(output, "\nAttachments ({}):\n{}\n", rows.len(), Table::new(rows));
                }

                if !state.images.is_empty() {
                    let _ = writeln!(output, "\nImages ({}):", state.images.len());
                    for (key, id) in &state.images {
                        let _ = writeln!(output, "   {key} -> {id}");
                    }
                }
                output
            }
        }
    }

    /// Formats an image listing.
    #[must_use]
    pub fn format_images(&self, images: &[Image]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(images).unwrap_or_default(),
            OutputFormat::Text => {
                if images.is_empty() {
                    return String::from("No images found.\n");
                }
                let rows: Vec<ImageRow> = images
                    .iter()
                    .map(|i| ImageRow {
                        id: i.id.clone(),
                        name: i.name.clone(),
                        image_type: i.image_type.clone().unwrap_or_else(|| String::from("-")),
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &"✓".green().to_string(), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", &"✗".red().to_string(), message)
    }

    fn message(&self, status: &str, marker: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{marker} {message}\n"),
        }
    }

    fn outcome_row(outcome: &ResourceOutcome) -> OutcomeRow {
        let result = if outcome.diagnostics.has_errors() {
            "failed".red().to_string()
        } else if outcome.diagnostics.is_empty() {
            "ok".green().to_string()
        } else {
            "ok (warnings)".yellow().to_string()
        };
        OutcomeRow {
            resource: outcome.address.clone(),
            action: Self::format_diff_type(outcome.operation),
            result,
        }
    }

    fn write_diagnostics<'a>(output: &mut String, outcomes: impl Iterator<Item = &'a ResourceOutcome>) {
        for outcome in outcomes {
            for diagnostic in outcome.diagnostics.iter() {
                let _ = writeln!(output, "   {}: {diagnostic}", outcome.address);
            }
        }
    }

    /// Formats a diff type with color.
    fn format_diff_type(diff_type: DiffType) -> String {
        match diff_type {
            DiffType::Create => "+create".green().to_string(),
            DiffType::Update => "~update".yellow().to_string(),
            DiffType::Replace => "-/+replace".yellow().to_string(),
            DiffType::Delete => "-delete".red().to_string(),
            DiffType::NoChange => "noop".dimmed().to_string(),
        }
    }

    fn short_hash(hash: &str) -> &str {
        &hash[..8.min(hash.len())]
    }
}
