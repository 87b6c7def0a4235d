//! Structured shapes the model must return, with their validation rules.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Seniority {
    Junior,
    #[serde(rename = "Mid-level")]
    MidLevel,
    Senior,
    Lead,
    Principal,
}

impl Seniority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Seniority::Junior => "Junior",
            Seniority::MidLevel => "Mid-level",
            Seniority::Senior => "Senior",
            Seniority::Lead => "Lead",
            Seniority::Principal => "Principal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JobAnalysis {
    #[validate(length(min = 1))]
    pub title: String,
    pub company: Option<String>,
    pub required_skills: Vec<String>,
    pub nice_to_have_skills: Option<Vec<String>>,
    pub experience_level: Option<String>,
}

impl JobAnalysis {
    pub fn fallback() -> Self {
        Self {
            title: "Software Engineer".to_string(),
            company: None,
            required_skills: vec![],
            nice_to_have_skills: Some(vec![]),
            experience_level: Some("Mid-level".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub title: String,
    pub company: String,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ResumeAnalysis {
    #[validate(length(min = 1))]
    pub name: String,
    pub email: Option<String>,
    pub location: Option<String>,
    pub seniority: Option<Seniority>,
    pub skills: Vec<String>,
    pub experience: Option<Vec<Experience>>,
}

impl ResumeAnalysis {
    pub fn fallback() -> Self {
        Self {
            name: "Unknown Candidate".to_string(),
            email: None,
            location: None,
            seniority: Some(Seniority::MidLevel),
            skills: vec![],
            experience: Some(vec![]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MatchAnalysis {
    #[validate(range(min = 0.0, max = 100.0))]
    pub match_percentage: f64,
    #[validate(length(max = 3))]
    pub top_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub reasoning: Option<String>,
}

impl MatchAnalysis {
    pub fn fallback() -> Self {
        Self {
            match_percentage: 50.0,
            top_skills: vec![],
            missing_skills: vec![],
            reasoning: Some("Unable to analyze match at this time".to_string()),
        }
    }
}
