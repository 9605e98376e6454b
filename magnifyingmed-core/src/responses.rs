//! Deterministic response text built from structured results.
//!
//! Narrative prose comes from the generator; everything here is derived
//! from findings and scores only.

use serde_json::json;

use crate::analysis::AnalysisResult;
use crate::context::ConversationContext;
use crate::extraction::{ASPECT_DATA_IMBALANCE, ASPECT_PERFORMANCE_GAPS};
use crate::findings::{Citation, fields};
use crate::scoring::Dimension;

/// Mitigation coverage below this share of studies is called out.
const LOW_METHOD_COVERAGE: f64 = 0.2;

fn pct(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

/// Headline findings, filtered by the aspects the user asked about.
pub fn findings_parts(
    result: &AnalysisResult,
    context: &ConversationContext,
    dark_skin_target: f64,
) -> Vec<String> {
    let mut parts = Vec::new();

    let total_datasets = result.dataset.count(fields::TOTAL_DATASETS);
    if context.wants_aspect(ASPECT_DATA_IMBALANCE) && total_datasets > 0 {
        let labelled = result
            .dataset
            .count(fields::DATASETS_WITH_RACE_LABELS)
            .min(total_datasets);
        let dark_skin = result
            .dataset
            .number(fields::AVG_DARK_SKIN_PROPORTION)
            .unwrap_or(0.0);
        parts.push(format!(
            "**Data Imbalance:** {}/{} datasets lack race labels. Dark skin representation averages {} (target: {}).",
            total_datasets - labelled,
            total_datasets,
            pct(dark_skin),
            pct(dark_skin_target)
        ));
    }

    let total_studies = result.subgroup.count(fields::TOTAL_STUDIES);
    if context.wants_aspect(ASPECT_PERFORMANCE_GAPS) && total_studies > 0 {
        let with_metrics = result
            .subgroup
            .count(fields::STUDIES_WITH_SUBGROUP_METRICS)
            .min(total_studies);
        let gap = result
            .subgroup
            .number(fields::AVG_PERFORMANCE_GAP)
            .unwrap_or(0.0);
        parts.push(format!(
            "**Performance Gaps:** Only {}/{} studies report subgroup metrics. Average performance gap: {:.1}%.",
            with_metrics,
            total_studies,
            gap * 100.0
        ));
    }

    let mitigation_total = result.mitigation.count(fields::TOTAL_STUDIES);
    let with_methods = result.mitigation.count(fields::STUDIES_WITH_FAIRNESS_METHODS);
    if mitigation_total > 0
        && f64::from(with_methods) < f64::from(mitigation_total) * LOW_METHOD_COVERAGE
    {
        parts.push(
            "**Mitigation Coverage:** Most studies don't apply fairness methods or validate outside the US."
                .to_string(),
        );
    }

    parts
}

/// The score block that heads every analysis response.
pub fn score_block(result: &AnalysisResult) -> String {
    let score = &result.score;
    let status = if score.flagged {
        "FLAGGED as under-explored"
    } else {
        "below the under-explored threshold"
    };
    let mut lines = vec![format!(
        "Under-Explored Bias Score for {} (past {} years): {:.2} (threshold {:.2}), {}. Severity: {}. Confidence: {}.",
        result.scope,
        result.years,
        score.rounded_score(),
        score.threshold,
        status,
        score.severity(),
        score.confidence
    )];
    if !score.drivers.is_empty() {
        lines.push("Key drivers:".to_string());
        lines.extend(score.drivers.iter().map(|d| format!("- {}", d.description)));
    }
    lines.join("\n")
}

/// Structured payload handed to the narrative prompt.
pub fn analysis_json(result: &AnalysisResult, findings: &[String]) -> String {
    let payload = json!({
        "findings": findings,
        "score": result.score.rounded_score(),
        "threshold": result.score.threshold,
        "flagged": result.score.flagged,
        "drivers": result.score.driver_descriptions(),
        "confidence": result.score.confidence,
        "breakdown": result.score.breakdown,
        "scope": result.scope,
        "years": result.years,
        "dataset_summary": result.dataset.summary,
        "subgroup_summary": result.subgroup.summary,
        "mitigation_summary": result.mitigation.summary,
    });
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}

/// Payload for the mitigation prompt.
pub fn mitigation_json(result: &AnalysisResult) -> String {
    let papers: Vec<_> = result
        .papers_with_methods()
        .into_iter()
        .map(|s| json!({"title": s.title, "methods": s.fairness_methods, "url": s.url}))
        .collect();
    let payload = json!({
        "scope": result.scope,
        "score_breakdown": result.score.breakdown,
        "drivers": result.score.driver_descriptions(),
        "mitigation_summary": result.mitigation.summary,
        "papers_with_methods": papers,
    });
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}

/// Compose the full analysis response around the generated narrative.
pub fn analysis_response(
    result: &AnalysisResult,
    findings: &[String],
    narrative: Option<&str>,
) -> String {
    let mut sections = vec![score_block(result)];
    match narrative {
        Some(text) if !text.trim().is_empty() => sections.push(text.trim().to_string()),
        _ => sections.extend(findings.iter().cloned()),
    }
    sections.push(crate::prompts::ANALYSIS_OPTIONS.to_string());
    sections.join("\n\n")
}

/// Re-present a stored analysis without new provider calls.
pub fn recap(result: &AnalysisResult) -> String {
    format!(
        "Here's the analysis I already ran for {}:\n\n{}\n\n{}",
        result.scope,
        score_block(result),
        crate::prompts::ANALYSIS_OPTIONS
    )
}

/// Papers that applied fairness methods, at most `max`.
pub fn mitigation_papers(result: &AnalysisResult, max: usize) -> Option<String> {
    let papers = result.papers_with_methods();
    if papers.is_empty() || max == 0 {
        return None;
    }
    let lines: Vec<String> = papers
        .iter()
        .take(max)
        .map(|p| {
            let url = p
                .url
                .as_ref()
                .map(|u| format!(" ({u})"))
                .unwrap_or_default();
            format!("- {} - Methods: {}{}", p.title, p.fairness_methods.join(", "), url)
        })
        .collect();
    Some(format!(
        "Recent papers that applied fairness methods:\n{}",
        lines.join("\n")
    ))
}

fn citation_line(c: &Citation) -> String {
    let mut line = format!("- {}", c.title);
    if let Some(year) = c.year {
        line.push_str(&format!(" ({year})"));
    }
    if let Some(url) = &c.url {
        line.push_str(&format!(" {url}"));
    }
    line
}

/// Sources behind the analysis, then papers with fairness methods.
pub fn papers_list(result: &AnalysisResult, max: usize) -> Option<String> {
    let citations = result.unique_citations();
    let mut sections = Vec::new();
    if !citations.is_empty() && max > 0 {
        let lines: Vec<String> = citations.iter().take(max).map(|c| citation_line(c)).collect();
        sections.push(format!(
            "Papers behind the {} analysis:\n{}",
            result.scope,
            lines.join("\n")
        ));
    }
    if let Some(methods) = mitigation_papers(result, max) {
        sections.push(methods);
    }
    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

pub fn dataset_explainer(result: &AnalysisResult, dark_skin_target: f64) -> String {
    let d = &result.dataset;
    let total = d.count(fields::TOTAL_DATASETS);
    let labelled = d.count(fields::DATASETS_WITH_RACE_LABELS).min(total);
    let mut lines = vec![format!(
        "Data imbalance in {}: {}/{} datasets report race labels (component score {:.2}).",
        result.scope,
        labelled,
        total,
        result.score.component(Dimension::RaceLabelAvailability)
    )];
    if let Some(dark) = d.number(fields::AVG_DARK_SKIN_PROPORTION) {
        lines.push(format!(
            "Dark skin tones make up {} of images on average, against a {} target.",
            pct(dark),
            pct(dark_skin_target)
        ));
    } else if let Some(minority) = d.number(fields::AVG_MINORITY_REPRESENTATION) {
        lines.push(format!(
            "Minority groups make up {} of samples on average.",
            pct(minority)
        ));
    } else {
        lines.push("The datasets don't report skin tone or minority composition.".to_string());
    }
    let diversity = d.category(fields::GEOGRAPHIC_DIVERSITY).unwrap_or("unreported");
    lines.push(format!("Geographic diversity of the datasets: {diversity}."));
    lines.join(" ")
}

pub fn performance_explainer(result: &AnalysisResult) -> String {
    let s = &result.subgroup;
    let total = s.count(fields::TOTAL_STUDIES);
    let with_metrics = s.count(fields::STUDIES_WITH_SUBGROUP_METRICS).min(total);
    let mut text = format!(
        "Subgroup performance in {}: {}/{} studies report metrics by race or skin tone (component score {:.2}).",
        result.scope,
        with_metrics,
        total,
        result.score.component(Dimension::SubgroupMetrics)
    );
    if let Some(gap) = s.number(fields::AVG_PERFORMANCE_GAP) {
        text.push_str(&format!(
            " Where reported, the average performance gap is {:.1} percentage points.",
            gap * 100.0
        ));
    }
    text
}

pub fn analysis_failed(scope: &str, reason: &str) -> String {
    format!(
        "I encountered an error while analyzing {scope}: {reason}. Please try again or provide more specific information."
    )
}

/// The analysis itself is intact; only the recommendations could not be written.
pub fn mitigation_failed(scope: &str, reason: &str) -> String {
    format!(
        "I couldn't put together mitigation recommendations for {scope} right now: {reason}. The analysis above still stands; ask again in a moment."
    )
}

pub fn await_go_ahead(scope: &str) -> String {
    format!(
        "No problem, I'll hold off. Tell me when you'd like me to analyze {scope}, or name a different field or condition."
    )
}

pub fn mitigation_response(scope: &str, recommendations: &str, papers: Option<&str>) -> String {
    let mut response = format!(
        "Based on the identified gaps in {scope} research, here are recommended mitigation methods:\n\n{}",
        recommendations.trim()
    );
    if let Some(papers) = papers {
        response.push_str("\n\n");
        response.push_str(papers.trim());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::{SourceTag, StudyRecord, Topic, TopicFindings};
    use crate::scoring::{BiasAggregator, ScoreWeights};

    fn result() -> AnalysisResult {
        let dataset = TopicFindings::new(Topic::Dataset)
            .with_count(fields::TOTAL_DATASETS, 10)
            .with_count(fields::DATASETS_WITH_RACE_LABELS, 2)
            .with_number(fields::AVG_DARK_SKIN_PROPORTION, 0.10)
            .with_category(fields::GEOGRAPHIC_DIVERSITY, "high")
            .with_citation(Citation::new("Skin tone audit", SourceTag::PubMed).with_year(2021));
        let subgroup = TopicFindings::new(Topic::Subgroup)
            .with_count(fields::TOTAL_STUDIES, 20)
            .with_count(fields::STUDIES_WITH_SUBGROUP_METRICS, 5)
            .with_number(fields::AVG_PERFORMANCE_GAP, 0.125);
        let mitigation = TopicFindings::new(Topic::Mitigation)
            .with_count(fields::TOTAL_STUDIES, 20)
            .with_count(fields::STUDIES_WITH_FAIRNESS_METHODS, 2)
            .with_count(fields::STUDIES_WITH_EXTERNAL_VALIDATION, 20)
            .with_category(fields::VALIDATION_GEOGRAPHIC_DIVERSITY, "high")
            .with_study(StudyRecord {
                title: "Fair lesion classifiers".into(),
                url: Some("https://example.org/fair".into()),
                fairness_methods: vec!["reweighting".into(), "augmentation".into()],
                ..Default::default()
            });
        let aggregator = BiasAggregator::new(ScoreWeights::default(), 0.30).unwrap();
        let score = aggregator.aggregate(&dataset, &subgroup, &mitigation);
        AnalysisResult::new("dermatology", 5, dataset, subgroup, mitigation, score)
    }

    #[test]
    fn test_findings_parts_follow_aspects() {
        let result = result();
        let ctx = ConversationContext::new();
        let parts = findings_parts(&result, &ctx, 0.25);
        assert_eq!(parts.len(), 3);
        assert!(parts[0].contains("8/10 datasets lack race labels"));
        assert!(parts[0].contains("averages 10% (target: 25%)"));
        assert!(parts[1].contains("Only 5/20 studies"));
        assert!(parts[1].contains("12.5%"));

        let mut ctx = ConversationContext::new();
        ctx.bias_aspects.insert(ASPECT_PERFORMANCE_GAPS.to_string());
        let parts = findings_parts(&result, &ctx, 0.25);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("**Performance Gaps:**"));
    }

    #[test]
    fn test_analysis_response_falls_back_to_findings() {
        let result = result();
        let parts = vec!["**Data Imbalance:** test".to_string()];
        let text = analysis_response(&result, &parts, None);
        assert!(text.starts_with("Under-Explored Bias Score for dermatology (past 5 years)"));
        assert!(text.contains("**Data Imbalance:** test"));
        assert!(text.ends_with(crate::prompts::ANALYSIS_OPTIONS));

        let text = analysis_response(&result, &parts, Some("Narrative here."));
        assert!(text.contains("Narrative here."));
        assert!(!text.contains("**Data Imbalance:** test"));
    }

    #[test]
    fn test_score_block_lists_drivers() {
        let block = score_block(&result());
        assert!(block.contains("Key drivers:"));
        assert!(block.contains("- Missing race labels in 8/10 datasets"));
    }

    #[test]
    fn test_papers_list_and_mitigation_papers() {
        let result = result();
        let papers = papers_list(&result, 5).unwrap();
        assert!(papers.contains("- Skin tone audit (2021)"));
        assert!(papers.contains(
            "- Fair lesion classifiers - Methods: reweighting, augmentation (https://example.org/fair)"
        ));
        assert!(papers_list(&result, 0).is_none());
    }

    #[test]
    fn test_explainers_use_counts() {
        let result = result();
        assert!(dataset_explainer(&result, 0.25).contains("2/10 datasets report race labels"));
        assert!(performance_explainer(&result).contains("5/20 studies"));
    }
}
