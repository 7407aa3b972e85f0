//! System-prompt construction for the chat gateway.
//!
//! The prompt is the base text (caller-supplied or default) followed by a
//! plain-text rendering of the assessment metrics the caller attached, so
//! the model can answer score, coverage, and cross-domain questions without
//! tool access. Sections with no data are omitted entirely.

use serde::Deserialize;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a security posture assistant for an \
organization's assessment workspace. Answer using the assessment data provided \
below when it is relevant, cite domains and scores precisely, and say clearly \
when the data does not answer the question.";

/// Assessment metrics attached to a chat request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentContext {
    #[serde(default)]
    pub assessment_name: Option<String>,
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub coverage_percent: Option<f64>,
    #[serde(default)]
    pub critical_gaps: Vec<CriticalGap>,
    #[serde(default)]
    pub domains: Vec<DomainMetrics>,
    /// Cross-assessment overview, present when the caller wants the model to
    /// compare domains.
    #[serde(default)]
    pub overview: Vec<DomainOverview>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalGap {
    pub control: String,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainMetrics {
    pub name: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub answered: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainOverview {
    pub domain: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub coverage_percent: Option<f64>,
    #[serde(default)]
    pub critical_count: Option<u32>,
}

pub(crate) fn build_system_prompt(
    base: Option<&str>,
    context: Option<&AssessmentContext>,
) -> String {
    let mut prompt = base.unwrap_or(DEFAULT_SYSTEM_PROMPT).trim().to_string();
    if let Some(context) = context {
        let rendered = render_context(context);
        if !rendered.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&rendered);
        }
    }
    prompt
}

fn render_context(context: &AssessmentContext) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(name) = &context.assessment_name {
        lines.push(format!("Assessment: {name}"));
    }
    if let Some(score) = context.overall_score {
        lines.push(format!("Overall score: {score:.1}/100"));
    }
    if let Some(coverage) = context.coverage_percent {
        lines.push(format!("Coverage: {coverage:.1}% of controls answered"));
    }

    if !context.critical_gaps.is_empty() {
        lines.push(String::new());
        lines.push("Critical gaps:".to_string());
        for gap in &context.critical_gaps {
            match &gap.domain {
                Some(domain) => lines.push(format!("- {} ({domain})", gap.control)),
                None => lines.push(format!("- {}", gap.control)),
            }
        }
    }

    if !context.domains.is_empty() {
        lines.push(String::new());
        lines.push("Per-domain breakdown:".to_string());
        for domain in &context.domains {
            lines.push(domain_line(domain));
        }
    }

    if !context.overview.is_empty() {
        lines.push(String::new());
        lines.push("All domains overview:".to_string());
        for entry in &context.overview {
            lines.push(overview_line(entry));
        }
    }

    if lines.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Assessment data\n");
    out.push_str(&lines.join("\n"));
    out
}

fn domain_line(domain: &DomainMetrics) -> String {
    let mut parts = Vec::new();
    if let Some(score) = domain.score {
        parts.push(format!("score {score:.1}"));
    }
    if let (Some(answered), Some(total)) = (domain.answered, domain.total) {
        parts.push(format!("{answered}/{total} answered"));
    }
    if parts.is_empty() {
        format!("- {}", domain.name)
    } else {
        format!("- {}: {}", domain.name, parts.join(", "))
    }
}

fn overview_line(entry: &DomainOverview) -> String {
    let mut parts = Vec::new();
    if let Some(score) = entry.score {
        parts.push(format!("score {score:.1}"));
    }
    if let Some(coverage) = entry.coverage_percent {
        parts.push(format!("coverage {coverage:.1}%"));
    }
    if let Some(count) = entry.critical_count {
        parts.push(format!("{count} critical gaps"));
    }
    if parts.is_empty() {
        format!("- {}", entry.domain)
    } else {
        format!("- {}: {}", entry.domain, parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_context() -> AssessmentContext {
        AssessmentContext {
            assessment_name: Some("Q3 ISO 27001".to_string()),
            overall_score: Some(72.5),
            coverage_percent: Some(81.0),
            critical_gaps: vec![
                CriticalGap {
                    control: "No MFA on admin accounts".to_string(),
                    domain: Some("Access Control".to_string()),
                },
                CriticalGap {
                    control: "Backups untested".to_string(),
                    domain: None,
                },
            ],
            domains: vec![
                DomainMetrics {
                    name: "Access Control".to_string(),
                    score: Some(64.0),
                    answered: Some(18),
                    total: Some(24),
                },
                DomainMetrics {
                    name: "Physical Security".to_string(),
                    score: None,
                    answered: None,
                    total: None,
                },
            ],
            overview: vec![DomainOverview {
                domain: "Network Security".to_string(),
                score: Some(88.0),
                coverage_percent: Some(100.0),
                critical_count: Some(0),
            }],
        }
    }

    #[test]
    fn renders_every_section_in_order() {
        let prompt = build_system_prompt(Some("Base prompt."), Some(&full_context()));

        let expected = "Base prompt.\n\n\
## Assessment data\n\
Assessment: Q3 ISO 27001\n\
Overall score: 72.5/100\n\
Coverage: 81.0% of controls answered\n\
\n\
Critical gaps:\n\
- No MFA on admin accounts (Access Control)\n\
- Backups untested\n\
\n\
Per-domain breakdown:\n\
- Access Control: score 64.0, 18/24 answered\n\
- Physical Security\n\
\n\
All domains overview:\n\
- Network Security: score 88.0, coverage 100.0%, 0 critical gaps";

        assert_eq!(prompt, expected);
    }

    #[test]
    fn empty_context_leaves_the_base_untouched() {
        let prompt = build_system_prompt(Some("Base prompt."), Some(&AssessmentContext::default()));
        assert_eq!(prompt, "Base prompt.");
    }

    #[test]
    fn missing_base_falls_back_to_the_default() {
        let prompt = build_system_prompt(None, None);
        assert_eq!(prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn context_deserializes_from_camel_case() {
        let context: AssessmentContext = serde_json::from_str(
            r#"{
                "assessmentName": "Annual review",
                "overallScore": 55,
                "coveragePercent": 40.5,
                "criticalGaps": [{"control": "Logging disabled", "domain": "Operations"}],
                "domains": [{"name": "Operations", "score": 30, "answered": 4, "total": 10}],
                "overview": [{"domain": "Operations", "criticalCount": 2}]
            }"#,
        )
        .unwrap();

        assert_eq!(context.assessment_name.as_deref(), Some("Annual review"));
        assert_eq!(context.overall_score, Some(55.0));
        assert_eq!(context.critical_gaps.len(), 1);
        assert_eq!(context.overview[0].critical_count, Some(2));
        assert_eq!(context.overview[0].score, None);
    }
}
