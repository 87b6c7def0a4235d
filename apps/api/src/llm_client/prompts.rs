// Prompt templates for every analyzer call.
// Replace the `{placeholder}` markers before sending.

/// Appended to every Gemini prompt; Gemini has no JSON response mode.
pub const GEMINI_JSON_SUFFIX: &str =
    "\n\nIMPORTANT: Return ONLY valid JSON, no markdown formatting or backticks.";

/// Job description extraction. Replace `{text}`.
pub const JOB_ANALYSIS_PROMPT: &str = r#"Analyze this job description and extract key information.
Return a JSON object with:
- title: job title
- company: company name (if mentioned)
- requiredSkills: array of required technical skills
- niceToHaveSkills: array of nice-to-have skills
- experienceLevel: Junior/Mid-level/Senior/Lead/Principal

Job Description:
{text}"#;

/// Resume extraction. Replace `{text}`.
pub const RESUME_ANALYSIS_PROMPT: &str = r#"Analyze this resume and extract key information.
Return a JSON object with:
- name: candidate's full name
- email: email address (if found)
- location: city/state/country (if mentioned)
- seniority: Junior/Mid-level/Senior/Lead/Principal (based on experience)
- skills: array of technical skills mentioned
- experience: array of work experiences with title, company, duration

Resume:
{text}"#;

/// Candidate/job comparison. Replace `{job_text}` and `{resume_text}`.
pub const MATCH_ANALYSIS_PROMPT: &str = r#"Compare this job description with the candidate's resume.
Calculate a match percentage (0-100) based on:
- Required skills match (60% weight)
- Experience level match (20% weight)
- Nice-to-have skills (20% weight)

Return a JSON object with:
- matchPercentage: number between 0-100
- topSkills: array of up to 3 most relevant skills the candidate has
- missingSkills: array of important required skills the candidate lacks
- reasoning: brief explanation of the match score

Job Description:
{job_text}

Resume:
{resume_text}"#;

pub fn job_analysis(text: &str) -> String {
    JOB_ANALYSIS_PROMPT.replace("{text}", text)
}

pub fn resume_analysis(text: &str) -> String {
    RESUME_ANALYSIS_PROMPT.replace("{text}", text)
}

pub fn match_analysis(job_text: &str, resume_text: &str) -> String {
    MATCH_ANALYSIS_PROMPT
        .replace("{job_text}", job_text)
        .replace("{resume_text}", resume_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_prompt_fills_both_documents() {
        let prompt = match_analysis("Rust engineer wanted", "Jane knows Rust");
        assert!(prompt.contains("Rust engineer wanted"));
        assert!(prompt.contains("Jane knows Rust"));
        assert!(!prompt.contains("{job_text}"));
        assert!(!prompt.contains("{resume_text}"));
    }
}
