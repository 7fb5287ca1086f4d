//! Coaching-option and expert catalogs
//!
//! Read-only configuration consumed by the request pipeline (prompt
//! template, behavioral instructions) and the summary generator (summary
//! template). A built-in catalog ships with the crate; `[coaching]` in the
//! config file replaces it.

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the session topic
pub const TOPIC_PLACEHOLDER: &str = "{user_topic}";

/// Topic used when a session has none
pub const DEFAULT_TOPIC: &str = "conversation";

/// Behavioral instructions appended to every system prompt unless the option
/// brings its own.
pub const DEFAULT_INSTRUCTIONS: &[&str] = &[
    "Keep the whole conversation in mind. Never ask the same question twice and remember what the user has told you.",
    "If the user says they are a beginner or have no experience, start teaching the basics right away instead of assessing them further.",
    "Teach something new in every response instead of repeating information or asking for clarification again and again.",
    "For technical subjects start from the most basic concepts and use simple analogies.",
    "Make every response unique and answer what the user just said.",
    "Explain any academic or complex term in plain words as soon as you use it.",
    "When the user answers briefly or unclearly, assume they need help and keep teaching.",
    "Be patient and encouraging with beginners.",
    "Use real-life examples anyone can relate to.",
    "If the exchange stalls on similar turns, introduce a new foundational concept to move forward.",
    "Your reply is spoken aloud: keep it under 120 words and avoid markdown.",
];

/// A conversation mode with its own prompt templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingOption {
    pub name: String,

    /// System prompt with a `{user_topic}` placeholder
    #[serde(alias = "prompt")]
    pub prompt_template: String,

    /// End-of-session feedback instruction with a `{user_topic}` placeholder
    #[serde(alias = "summaryPrompt")]
    pub summary_prompt_template: String,

    #[serde(default)]
    pub abstract_image: Option<String>,

    /// Overrides [`DEFAULT_INSTRUCTIONS`] when non-empty
    #[serde(default)]
    pub instructions: Vec<String>,
}

impl CoachingOption {
    pub fn new(
        name: impl Into<String>,
        prompt_template: impl Into<String>,
        summary_prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            prompt_template: prompt_template.into(),
            summary_prompt_template: summary_prompt_template.into(),
            abstract_image: None,
            instructions: Vec::new(),
        }
    }

    pub fn prompt_for(&self, topic: &str) -> String {
        substitute_topic(&self.prompt_template, topic)
    }

    pub fn summary_prompt_for(&self, topic: &str) -> String {
        substitute_topic(&self.summary_prompt_template, topic)
    }

    pub fn instructions(&self) -> Vec<&str> {
        if self.instructions.is_empty() {
            DEFAULT_INSTRUCTIONS.to_vec()
        } else {
            self.instructions.iter().map(String::as_str).collect()
        }
    }
}

fn substitute_topic(template: &str, topic: &str) -> String {
    let topic = topic.trim();
    let topic = if topic.is_empty() { DEFAULT_TOPIC } else { topic };
    template.replace(TOPIC_PLACEHOLDER, topic)
}

/// Coaching persona the user talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expert {
    pub name: String,
    pub avatar: String,
}

impl Expert {
    pub fn new(name: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            avatar: avatar.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoachingCatalog {
    options: Vec<CoachingOption>,
    experts: Vec<Expert>,
}

impl Default for CoachingCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CoachingCatalog {
    pub fn new(options: Vec<CoachingOption>, experts: Vec<Expert>) -> Self {
        Self { options, experts }
    }

    /// Built-in catalog, with configured options replacing the defaults
    pub fn with_options(options: Vec<CoachingOption>) -> Self {
        if options.is_empty() {
            return Self::builtin();
        }
        Self {
            options,
            experts: builtin_experts(),
        }
    }

    pub fn builtin() -> Self {
        Self {
            options: builtin_options(),
            experts: builtin_experts(),
        }
    }

    pub fn option(&self, name: &str) -> Option<&CoachingOption> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn expert(&self, name: &str) -> Option<&Expert> {
        self.experts.iter().find(|e| e.name == name)
    }

    /// Named expert, or the first one in the catalog
    pub fn expert_or_default(&self, name: &str) -> Expert {
        self.expert(name)
            .or_else(|| self.experts.first())
            .cloned()
            .unwrap_or_else(|| Expert::new(name, ""))
    }

    pub fn options(&self) -> &[CoachingOption] {
        &self.options
    }

    pub fn experts(&self) -> &[Expert] {
        &self.experts
    }
}

fn builtin_experts() -> Vec<Expert> {
    vec![
        Expert::new("Joanna", "/t1.jpg"),
        Expert::new("Sallie", "/t2.jpg"),
        Expert::new("Mathhew", "/t3.jpg"),
    ]
}

fn builtin_options() -> Vec<CoachingOption> {
    let mut options = vec![
        CoachingOption::new(
            "Lecture on Topic",
            "You are a friendly voice tutor giving a spoken lecture on {user_topic}. \
             Explain one idea at a time in clear, conversational language and check \
             the learner's understanding as you go.",
            "Based on this conversation about {user_topic}, write structured notes: \
             the key concepts covered, a short summary of each, and three suggestions \
             for what to study next.",
        ),
        CoachingOption::new(
            "Mock Interview",
            "You are an interviewer running a realistic mock interview for {user_topic}. \
             Ask one question at a time, follow up on the candidate's answers and keep \
             a professional but encouraging tone.",
            "Based on this mock interview for {user_topic}, give structured feedback: \
             strengths, areas to improve with concrete examples from the answers, and \
             an overall readiness rating out of 10.",
        ),
        CoachingOption::new(
            "Ques Ans Prep",
            "You are a study coach helping the user prepare questions and answers on \
             {user_topic}. Ask a question, wait for the answer, then correct it and \
             explain the best answer briefly.",
            "Based on this question and answer session on {user_topic}, list the \
             questions asked, how well each was answered, and the topics to review.",
        ),
        CoachingOption::new(
            "Language Skill",
            "You are a patient language coach practicing {user_topic} with the user. \
             Keep sentences short, gently correct mistakes and ask the user to try \
             again with the corrected phrasing.",
            "Based on this language practice session on {user_topic}, summarize the \
             vocabulary and grammar covered, the recurring mistakes, and exercises for \
             the next session.",
        ),
        CoachingOption::new(
            "Meditation",
            "You are a calm meditation guide leading a spoken session on {user_topic}. \
             Use slow, soothing language, short pauses and simple breathing cues.",
            "Based on this meditation session on {user_topic}, write a short reflection: \
             what the user practiced, how they responded, and a suggestion for their \
             next session.",
        ),
    ];

    let images = [
        "/lecture.png",
        "/interview.png",
        "/qa.png",
        "/language.png",
        "/meditation.png",
    ];
    for (option, image) in options.iter_mut().zip(images) {
        option.abstract_image = Some(image.to_string());
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_has_all_modes() {
        let catalog = CoachingCatalog::builtin();
        for name in [
            "Lecture on Topic",
            "Mock Interview",
            "Ques Ans Prep",
            "Language Skill",
            "Meditation",
        ] {
            let option = catalog.option(name).expect("builtin option");
            assert!(option.prompt_template.contains(TOPIC_PLACEHOLDER));
            assert!(option.summary_prompt_template.contains(TOPIC_PLACEHOLDER));
        }
    }

    #[test]
    fn test_topic_substitution() {
        let option = CoachingOption::new("x", "Teach {user_topic}.", "Summarize {user_topic}.");
        assert_eq!(option.prompt_for("recursion"), "Teach recursion.");
        assert_eq!(option.prompt_for("  "), "Teach conversation.");
        assert_eq!(option.summary_prompt_for("sql"), "Summarize sql.");
    }

    #[test]
    fn test_unknown_expert_falls_back_to_first() {
        let catalog = CoachingCatalog::builtin();
        assert_eq!(catalog.expert_or_default("Nobody").name, "Joanna");
        assert_eq!(catalog.expert_or_default("Sallie").avatar, "/t2.jpg");
    }
}
