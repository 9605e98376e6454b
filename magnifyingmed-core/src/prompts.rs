//! Prompt templates and fixed conversational text.

use crate::extraction::MEDICAL_FIELDS;
use crate::findings::Topic;

pub const GREETING: &str = "Hello! I'm MagnifyingMed. I analyze racial bias in medical AI research using current literature.

Tell me what medical field or condition you'd like me to analyze (e.g., dermatology, skin cancer, cardiology), and I'll provide research-backed findings on bias gaps.";

pub const ASK_FOR_FIELD: &str = "What medical field or condition would you like me to analyze? (e.g., dermatology, cardiology, radiology, skin cancer, heart disease)";

pub const ANALYSIS_OPTIONS: &str = "I can also provide specific mitigation methods, show recent papers that address these gaps, or analyze a different medical field.";

pub const REACTION_ACKNOWLEDGEMENT: &str = "Exactly. The issue starts with who's represented in the data and extends to how disease is diagnosed and treated. When clinical norms are built from biased datasets, the AI inherits and amplifies those biases.";

pub const DEFAULT_MENU: &str = "I can help you with:
1. Provide mitigation method recommendations
2. Answer specific questions about bias in medical AI
3. Analyze a different medical field";

const ANALYST_PREAMBLE: &str = "You are an equity-focused biomedical analyst. Output valid JSON only.";

/// Ask the model for exactly one field name.
pub fn field_extraction(utterance: &str) -> String {
    format!(
        "Extract the medical field from this user input. Return ONLY the field name (one word) or \"none\" if unclear.

User input: {utterance}

Common fields: {fields}

Return only the field name:",
        fields = MEDICAL_FIELDS.join(", ")
    )
}

/// JSON extraction prompt for one topic.
pub fn topic_analysis(topic: Topic, scope: &str, years: u32) -> String {
    let body = match topic {
        Topic::Dataset => format!(
            r#"Analyze datasets for {scope} from research published in the past {years} years. Extract information about race/ethnicity labels, skin-tone/Fitzpatrick distribution (if applicable to the medical field), and geography/sites.

Return JSON in this format:
{{
  "summary": {{
    "total_datasets": 10,
    "datasets_with_race_labels": 3,
    "avg_dark_skin_proportion": 0.15,
    "avg_minority_representation": 0.12,
    "geographic_diversity": "low/medium/high"
  }},
  "citations": [{{"title": "Paper title", "year": 2022, "url": "paper URL", "source": "pubmed"}}]
}}"#
        ),
        Topic::Subgroup => format!(
            r#"From research about {scope} published in the past {years} years, extract subgroup metrics for different racial/ethnic groups or skin tones (if applicable). Reference specific papers by title.

Return JSON in this format:
{{
  "no_subgroup_reporting": 12,
  "summary": {{
    "total_studies": 30,
    "studies_with_subgroup_metrics": 18,
    "avg_performance_gap": 0.12
  }},
  "citations": [{{"title": "Paper title", "year": 2022, "url": "paper URL", "source": "openalex"}}]
}}"#
        ),
        Topic::Mitigation => format!(
            r#"Analyze {scope} research from the past {years} years for fairness method application and external validation. Reference specific papers by title when listing methods.

Return JSON in this format:
{{
  "validation": {{"geographic_diversity": "low/medium/high"}},
  "studies": [{{"paper": "Paper title", "fairness_methods": ["reweighting"], "url": "paper URL"}}],
  "summary": {{
    "total_studies": 30,
    "studies_with_fairness_methods": 5,
    "studies_with_external_validation": 2
  }},
  "citations": [{{"title": "Paper title", "year": 2022, "url": "paper URL", "source": "arxiv"}}]
}}"#
        ),
    };
    format!("{ANALYST_PREAMBLE}\n\n{body}")
}

/// Narrative summary of a completed analysis. `analysis_json` carries the
/// findings, score, and drivers.
pub fn analysis_narrative(scope: &str, years: u32, score: f64, analysis_json: &str) -> String {
    format!(
        "You are an equity-focused biomedical analyst. Based on this analysis of {scope} research (past {years} years), write a clear, research-backed response for the user.

Analysis Results:
{analysis_json}

Write a natural, informative response that:
1. Summarizes the key findings about racial bias gaps
2. References specific research patterns and data
3. Explains the Under-Explored Bias Score ({score:.2}) and what it means
4. Highlights the main drivers of bias
5. Is conversational but informative

Keep it concise (3-4 paragraphs max) and focus on actionable insights from the research."
    )
}

pub fn mitigation(scope: &str, analysis_json: &str, question: Option<&str>) -> String {
    format!(
        "You are an equity-focused biomedical analyst. Based on this bias analysis for {scope}, provide specific, research-backed mitigation recommendations.

Analysis Results:
{analysis_json}

User question context: {question}

Provide practical, research-backed mitigation methods that address the identified gaps. Reference specific techniques from the literature when possible. Format as clear, actionable recommendations with brief explanations of why each method helps.",
        question = question.unwrap_or("general recommendations")
    )
}

pub fn paper_suggestions(scope: &str, years: u32) -> String {
    format!(
        "Based on research about {scope} and racial bias in medical AI, suggest 2-3 relevant recent papers (published in the past {years} years) that address fairness or bias mitigation.

Format as a list with paper titles and brief descriptions of how they address bias. If you know specific papers, include them. Otherwise, suggest the types of papers researchers should look for."
    )
}

pub fn follow_up(conversation_summary: &str, question: &str) -> String {
    format!(
        "Based on this conversation about racial bias in medical AI research:

{conversation_summary}

User question: {question}

Provide a helpful, concise response. If the user is asking about specific mitigation methods, bias aspects, or wants to see papers, provide that information. Keep responses conversational and natural."
    )
}
