//! `analyze` subcommand: which properties make good category folders?
//!
//! Samples the first documents of each configured container, runs the core
//! suitability checks, and prints a report ending with a suggested
//! `categorization.properties` list.

use std::fmt::Write as _;

use anyhow::Result;
use notion_mirror_core::contract::ContentSource;
use notion_mirror_core::pool::short_id;
use notion_mirror_core::retry::{with_retry, RetryPolicy};
use notion_mirror_core::suitability::{assess_sample, suggest_properties, PropertyAssessment};
use tracing::{error, info};

/// Documents sampled per container.
pub const SAMPLE_SIZE: usize = 10;
/// Values shown per property.
pub const TOP_VALUES: usize = 5;

#[derive(Debug)]
pub struct ContainerAnalysis {
    pub container_id: String,
    pub name: String,
    pub sampled: usize,
    pub properties: Vec<PropertyAssessment>,
}

pub async fn analyze_containers<S>(
    source: &S,
    containers: &[String],
    retry: &RetryPolicy,
) -> Vec<ContainerAnalysis>
where
    S: ContentSource + ?Sized,
{
    let mut analyses = Vec::new();
    for container_id in containers {
        let name = match with_retry(retry, "get_container", || source.get_container(container_id)).await {
            Ok(c) if !c.name.trim().is_empty() => c.name.trim().to_string(),
            Ok(_) => format!("数据库_{}", short_id(container_id)),
            Err(e) => {
                error!(container_id = %container_id, error = %e, "[ANALYZE] Could not read container");
                continue;
            }
        };
        let sample = match with_retry(retry, "query_container", || {
            source.query_container(container_id, None)
        })
        .await
        {
            Ok(page) => page.results.into_iter().take(SAMPLE_SIZE).collect::<Vec<_>>(),
            Err(e) => {
                error!(container_id = %container_id, error = %e, "[ANALYZE] Could not sample container");
                continue;
            }
        };
        info!(container = %name, sampled = sample.len(), "[ANALYZE] Sampled container");
        analyses.push(ContainerAnalysis {
            container_id: container_id.clone(),
            name,
            sampled: sample.len(),
            properties: assess_sample(&sample),
        });
    }
    analyses
}

/// Human-readable report.
pub fn render_report(analyses: &[ContainerAnalysis]) -> Result<String> {
    let mut out = String::new();
    for analysis in analyses {
        writeln!(
            out,
            "== {} ({}) - {} documents sampled",
            analysis.name, analysis.container_id, analysis.sampled
        )?;
        for property in &analysis.properties {
            let verdict = match &property.verdict {
                Ok(()) => "suitable".to_string(),
                Err(reason) => format!("not suitable: {reason}"),
            };
            writeln!(out, "  {} [{}] {}", property.name, property.kind, verdict)?;
            let values = property
                .top_values(TOP_VALUES)
                .into_iter()
                .map(|(value, count)| format!("{value} ({count})"))
                .collect::<Vec<_>>();
            if !values.is_empty() {
                writeln!(out, "      {}", values.join(", "))?;
            }
        }
    }
    let suggested = suggest_properties(analyses.iter().flat_map(|a| a.properties.iter()));
    if suggested.is_empty() {
        writeln!(out, "\nNo property looks suitable for categorization.")?;
    } else {
        writeln!(out, "\nSuggested configuration:")?;
        writeln!(out, "sync:\n  categorization:\n    enabled: true\n    properties:")?;
        for name in suggested {
            writeln!(out, "      - {name}")?;
        }
    }
    Ok(out)
}
