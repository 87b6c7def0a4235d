//! Outreach message templates keyed by match score.

use serde::{Deserialize, Serialize};

pub const HIGH_MATCH_THRESHOLD: f64 = 80.0;
pub const MID_MATCH_THRESHOLD: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTemplate {
    HighMatch,
    MidMatch,
    LowMatch,
}

impl MessageTemplate {
    pub fn for_score(score: f64) -> Self {
        if score >= HIGH_MATCH_THRESHOLD {
            MessageTemplate::HighMatch
        } else if score >= MID_MATCH_THRESHOLD {
            MessageTemplate::MidMatch
        } else {
            MessageTemplate::LowMatch
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageTemplate::HighMatch => "high_match",
            MessageTemplate::MidMatch => "mid_match",
            MessageTemplate::LowMatch => "low_match",
        }
    }
}

/// Renders the follow-up message a recruiter sends after an analysis.
/// `top_skill` and `missing_skill` are the first entries of the analysis
/// skill lists, when present. Blank skills count as absent.
pub fn generate_follow_up_message(
    score: f64,
    candidate_name: &str,
    top_skill: Option<&str>,
    missing_skill: Option<&str>,
) -> String {
    let present = |s: &&str| !s.trim().is_empty();
    let top_skill = top_skill.filter(present).unwrap_or("your skills");
    let missing_skill = missing_skill.filter(present);
    match MessageTemplate::for_score(score) {
        MessageTemplate::HighMatch => format!(
            "Hey {candidate_name}, I had a look at your resume \u{2014} you seem like a great fit for a role we're hiring for. \
             Your experience with {top_skill} particularly caught my attention. Are you open for a quick call this week?"
        ),
        MessageTemplate::MidMatch => format!(
            "Thanks for sharing your resume, {candidate_name}. I can see strong experience in {top_skill}, \
             but we're currently prioritizing candidates with more depth in {}. I'll keep you in mind for future opportunities!",
            missing_skill.unwrap_or("some key areas")
        ),
        MessageTemplate::LowMatch => format!(
            "Hi {candidate_name}, thanks for applying! At this stage, the role requires strong {} experience, \
             which we couldn't quite match from your resume. Happy to chat about future roles though \u{2014} stay in touch!",
            missing_skill.unwrap_or("technical")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_thresholds() {
        assert_eq!(MessageTemplate::for_score(100.0), MessageTemplate::HighMatch);
        assert_eq!(MessageTemplate::for_score(80.0), MessageTemplate::HighMatch);
        assert_eq!(MessageTemplate::for_score(79.9), MessageTemplate::MidMatch);
        assert_eq!(MessageTemplate::for_score(60.0), MessageTemplate::MidMatch);
        assert_eq!(MessageTemplate::for_score(59.0), MessageTemplate::LowMatch);
        assert_eq!(MessageTemplate::for_score(0.0), MessageTemplate::LowMatch);
    }

    #[test]
    fn test_high_match_mentions_top_skill() {
        let msg = generate_follow_up_message(91.0, "Ada", Some("Rust"), Some("Go"));
        assert!(msg.starts_with("Hey Ada"));
        assert!(msg.contains("Your experience with Rust"));
        assert!(!msg.contains("Go"));
    }

    #[test]
    fn test_mid_match_defaults_missing_skill() {
        let msg = generate_follow_up_message(65.0, "Ada", Some("Rust"), None);
        assert!(msg.contains("strong experience in Rust"));
        assert!(msg.contains("more depth in some key areas"));
    }

    #[test]
    fn test_low_match_defaults_both_skills() {
        let msg = generate_follow_up_message(20.0, "Ada", None, None);
        assert!(msg.starts_with("Hi Ada"));
        assert!(msg.contains("requires strong technical experience"));
    }

    #[test]
    fn test_blank_skills_use_defaults() {
        let msg = generate_follow_up_message(85.0, "Ada", Some(""), None);
        assert!(msg.contains("Your experience with your skills"));

        let msg = generate_follow_up_message(30.0, "Ada", Some("Rust"), Some("  "));
        assert!(msg.contains("requires strong technical experience"));
    }

    #[test]
    fn test_template_serializes_snake_case() {
        let json = serde_json::to_string(&MessageTemplate::MidMatch).unwrap();
        assert_eq!(json, "\"mid_match\"");
        assert_eq!(MessageTemplate::MidMatch.as_str(), "mid_match");
    }
}
