//! Recommendation data model.
//!
//! A [`Recommendation`] is the atomic unit every component consumes. This
//! module also hosts the small parsing helpers shared by the components
//! (priority ranks, category ranks, time estimates) and the
//! [`normalize`] submodule that derives comparison keys.

pub mod normalize;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};

/// Placeholder used when no member time estimate parses.
pub const UNKNOWN_TIME_ESTIMATE: &str = "Unknown";

/// Hours in a working day, used when converting day-based estimates.
const HOURS_PER_DAY: f64 = 8.0;
/// Hours in a working week.
const HOURS_PER_WEEK: f64 = 40.0;
/// Hours in a working month.
const HOURS_PER_MONTH: f64 = 160.0;

// ============================================================================
// Priority
// ============================================================================

/// Recommendation priority, ordered from most to least urgent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Must be done first.
    Critical,
    /// Important.
    High,
    /// Default priority.
    #[default]
    Medium,
    /// Can wait.
    Low,
    /// Optional polish.
    NiceToHave,
}

impl Priority {
    /// Tie-break rank used by the topological sort (lower sorts first).
    ///
    /// `NICE_TO_HAVE` shares the rank given to unknown priorities.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
            Priority::NiceToHave => 4,
        }
    }

    /// Strength used when picking the highest priority of a group (higher wins).
    pub fn weight(&self) -> u8 {
        match self {
            Priority::Critical => 5,
            Priority::High => 4,
            Priority::Medium => 3,
            Priority::Low => 2,
            Priority::NiceToHave => 1,
        }
    }

    /// Get the priority name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
            Priority::NiceToHave => "NICE_TO_HAVE",
        }
    }

    /// The highest priority in an iterator, if any.
    pub fn highest<I: IntoIterator<Item = Priority>>(priorities: I) -> Option<Priority> {
        priorities.into_iter().max_by_key(|p| p.weight())
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            "nice_to_have" => Ok(Priority::NiceToHave),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Tie-break rank for a recommendation category (lower sorts first).
///
/// Unknown or missing categories rank last.
pub fn category_rank(category: Option<&str>) -> u8 {
    let Some(category) = category else {
        return 4;
    };
    match category.trim().to_lowercase().as_str() {
        "quick win" => 0,
        "strategic project" => 1,
        "medium priority" => 2,
        "low priority" => 3,
        _ => 4,
    }
}

// ============================================================================
// Recommendation
// ============================================================================

/// A proposed unit of work extracted from a source document or AI analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Stable identifier, unique within a processing run.
    pub id: String,
    /// Short title.
    pub title: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Ordered implementation steps.
    #[serde(default)]
    pub implementation_steps: Vec<String>,
    /// Priority.
    #[serde(default)]
    pub priority: Priority,
    /// Document or engine that produced this recommendation.
    pub source_label: String,
    /// Free-form duration, e.g. "4 hours".
    #[serde(default)]
    pub time_estimate: String,
    /// Optional category such as "Quick Win".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Recommendation {
    /// Create a new recommendation with the required fields.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            implementation_steps: Vec::new(),
            priority: Priority::default(),
            source_label: source_label.into(),
            time_estimate: String::new(),
            category: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append an implementation step.
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.implementation_steps.push(step.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the time estimate.
    pub fn with_time_estimate(mut self, estimate: impl Into<String>) -> Self {
        self.time_estimate = estimate.into();
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Title, description and steps joined into one lower-cased string.
    pub fn combined_text(&self) -> String {
        let mut text = String::with_capacity(
            self.title.len() + self.description.len() + 16 * self.implementation_steps.len(),
        );
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.description);
        for step in &self.implementation_steps {
            text.push('\n');
            text.push_str(step);
        }
        text.to_lowercase()
    }

    /// Parsed time estimate in hours.
    pub fn estimated_hours(&self) -> Option<f64> {
        parse_time_estimate(&self.time_estimate)
    }

    /// Check the record invariants (non-empty id and source label).
    pub fn validate(&self) -> PlanResult<()> {
        if self.id.trim().is_empty() {
            return Err(PlanError::validation("id", "cannot be empty"));
        }
        if self.source_label.trim().is_empty() {
            return Err(PlanError::validation(
                "source_label",
                format!("cannot be empty (recommendation {})", self.id),
            ));
        }
        Ok(())
    }
}

/// Validate every recommendation and reject duplicate IDs.
pub fn validate_batch(recommendations: &[Recommendation]) -> PlanResult<()> {
    let mut seen = HashSet::with_capacity(recommendations.len());
    for rec in recommendations {
        rec.validate()?;
        if !seen.insert(rec.id.as_str()) {
            return Err(PlanError::validation(
                "id",
                format!("duplicate recommendation id: {}", rec.id),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Time Estimates
// ============================================================================

/// Parse a free-form duration into hours.
///
/// Accepts minutes, hours, days, weeks and months, abbreviated or spelled
/// out, and ranges such as `"2-4 hours"` (midpoint). A bare number is read as
/// hours. Returns `None` when no number is present or the unit is unknown.
pub fn parse_time_estimate(raw: &str) -> Option<f64> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    let mut numbers: Vec<f64> = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut current_number = String::new();
    let mut current_word = String::new();

    for c in text.chars() {
        if c.is_ascii_digit() || (c == '.' && !current_number.is_empty()) {
            if !current_word.is_empty() {
                words.push(std::mem::take(&mut current_word));
            }
            current_number.push(c);
        } else if c.is_alphabetic() {
            if !current_number.is_empty() {
                numbers.push(current_number.trim_end_matches('.').parse().ok()?);
                current_number.clear();
            }
            current_word.push(c);
        } else {
            if !current_number.is_empty() {
                numbers.push(current_number.trim_end_matches('.').parse().ok()?);
                current_number.clear();
            }
            if !current_word.is_empty() {
                words.push(std::mem::take(&mut current_word));
            }
        }
    }
    if !current_number.is_empty() {
        numbers.push(current_number.trim_end_matches('.').parse().ok()?);
    }
    if !current_word.is_empty() {
        words.push(current_word);
    }

    let value = match numbers.as_slice() {
        [] => return None,
        [single] => *single,
        [low, high, ..] => (low + high) / 2.0,
    };

    let multiplier = match words.iter().find_map(|w| unit_multiplier(w)) {
        Some(m) => m,
        None if words.iter().all(|w| is_filler_word(w)) => 1.0,
        None => return None,
    };

    Some(value * multiplier)
}

fn unit_multiplier(word: &str) -> Option<f64> {
    match word {
        "m" | "min" | "mins" | "minute" | "minutes" => Some(1.0 / 60.0),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(1.0),
        "d" | "day" | "days" => Some(HOURS_PER_DAY),
        "w" | "wk" | "wks" | "week" | "weeks" => Some(HOURS_PER_WEEK),
        "mo" | "month" | "months" => Some(HOURS_PER_MONTH),
        _ => None,
    }
}

fn is_filler_word(word: &str) -> bool {
    matches!(word, "to" | "about" | "approx" | "approximately" | "around" | "roughly" | "or")
}

/// Format an hour value the way merged recommendations report it.
pub fn format_hours(hours: f64) -> String {
    format!("{:.1} hours", hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Priority tests
    // ========================================================================

    #[test]
    fn test_priority_rank_order() {
        assert_eq!(Priority::Critical.rank(), 0);
        assert_eq!(Priority::High.rank(), 1);
        assert_eq!(Priority::Medium.rank(), 2);
        assert_eq!(Priority::Low.rank(), 3);
        assert_eq!(Priority::NiceToHave.rank(), 4);
    }

    #[test]
    fn test_priority_highest() {
        let highest = Priority::highest(vec![Priority::Low, Priority::High, Priority::Medium]);
        assert_eq!(highest, Some(Priority::High));
        assert_eq!(Priority::highest(Vec::new()), None);
    }

    #[test]
    fn test_priority_from_str_variants() {
        assert_eq!("CRITICAL".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(
            "nice to have".parse::<Priority>().unwrap(),
            Priority::NiceToHave
        );
        assert_eq!(
            "Nice-To-Have".parse::<Priority>().unwrap(),
            Priority::NiceToHave
        );
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_serde_spelling() {
        let json = serde_json::to_string(&Priority::NiceToHave).unwrap();
        assert_eq!(json, "\"NICE_TO_HAVE\"");
        let parsed: Priority = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(parsed, Priority::Critical);
    }

    #[test]
    fn test_category_rank() {
        assert_eq!(category_rank(Some("Quick Win")), 0);
        assert_eq!(category_rank(Some("strategic project")), 1);
        assert_eq!(category_rank(Some(" Medium Priority ")), 2);
        assert_eq!(category_rank(Some("Low Priority")), 3);
        assert_eq!(category_rank(Some("Research")), 4);
        assert_eq!(category_rank(None), 4);
    }

    // ========================================================================
    // Recommendation tests
    // ========================================================================

    #[test]
    fn test_recommendation_builder() {
        let rec = Recommendation::new("r1", "Add caching", "doc-a")
            .with_description("Cache hot paths")
            .with_step("Profile")
            .with_step("Add LRU")
            .with_priority(Priority::High)
            .with_time_estimate("4 hours")
            .with_category("Quick Win");

        assert_eq!(rec.id, "r1");
        assert_eq!(rec.implementation_steps, vec!["Profile", "Add LRU"]);
        assert_eq!(rec.priority, Priority::High);
        assert_eq!(rec.category.as_deref(), Some("Quick Win"));
        assert_eq!(rec.estimated_hours(), Some(4.0));
    }

    #[test]
    fn test_recommendation_deserialize_minimal() {
        let json = r#"{"id": "r1", "title": "Do it", "source_label": "doc"}"#;
        let rec: Recommendation = serde_json::from_str(json).unwrap();
        assert_eq!(rec.priority, Priority::Medium);
        assert!(rec.description.is_empty());
        assert!(rec.category.is_none());
    }

    #[test]
    fn test_recommendation_combined_text_is_lowercase() {
        let rec = Recommendation::new("r1", "Train Model", "doc")
            .with_description("Uses GPUs")
            .with_step("Collect DATA");
        let text = rec.combined_text();
        assert!(text.contains("train model"));
        assert!(text.contains("uses gpus"));
        assert!(text.contains("collect data"));
    }

    #[test]
    fn test_recommendation_validate() {
        assert!(Recommendation::new("r1", "t", "doc").validate().is_ok());
        assert!(Recommendation::new("", "t", "doc").validate().is_err());
        assert!(Recommendation::new("r1", "t", "  ").validate().is_err());
    }

    #[test]
    fn test_validate_batch_rejects_duplicate_ids() {
        let recs = vec![
            Recommendation::new("r1", "a", "doc"),
            Recommendation::new("r1", "b", "doc"),
        ];
        let err = validate_batch(&recs).unwrap_err();
        assert!(err.to_string().contains("duplicate recommendation id: r1"));
    }

    // ========================================================================
    // Time estimate tests
    // ========================================================================

    #[test]
    fn test_parse_time_estimate_units() {
        assert_eq!(parse_time_estimate("4 hours"), Some(4.0));
        assert_eq!(parse_time_estimate("4h"), Some(4.0));
        assert_eq!(parse_time_estimate("1.5 hrs"), Some(1.5));
        assert_eq!(parse_time_estimate("30 minutes"), Some(0.5));
        assert_eq!(parse_time_estimate("2 days"), Some(16.0));
        assert_eq!(parse_time_estimate("1 week"), Some(40.0));
        assert_eq!(parse_time_estimate("6"), Some(6.0));
    }

    #[test]
    fn test_parse_time_estimate_ranges() {
        assert_eq!(parse_time_estimate("2-4 hours"), Some(3.0));
        assert_eq!(parse_time_estimate("1 to 3 days"), Some(16.0));
        assert_eq!(parse_time_estimate("about 2 weeks"), Some(80.0));
    }

    #[test]
    fn test_parse_time_estimate_rejects_garbage() {
        assert_eq!(parse_time_estimate(""), None);
        assert_eq!(parse_time_estimate("Unknown"), None);
        assert_eq!(parse_time_estimate("soon"), None);
        assert_eq!(parse_time_estimate("3 sprints"), None);
    }

    #[test]
    fn test_format_hours() {
        assert_eq!(format_hours(3.0), "3.0 hours");
        assert_eq!(format_hours(2.5), "2.5 hours");
    }
}
