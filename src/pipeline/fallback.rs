use crate::llm::ModelError;

/// Reply when the completion came back without any choices
pub const MALFORMED: &str = "I apologize, but the AI service is having difficulty processing your request. Let's try something simpler or rephrase your question.";

/// Canned, user-safe reply for an error that will not be retried
pub fn for_error(error: &ModelError) -> &'static str {
    match error {
        ModelError::Timeout(_) => {
            "I'm having trouble connecting right now. Could you ask a simpler question or try again in a moment?"
        }
        ModelError::Auth(_) => {
            "I seem to be having a connection issue. Let's try something else or simpler."
        }
        ModelError::RateLimited => {
            "I'm getting a lot of requests right now. Could we wait a moment and try again?"
        }
        ModelError::Server(_) => {
            "My services are having some trouble at the moment. Let's try again with a simpler request."
        }
        ModelError::Network(_) => {
            "I'm having trouble connecting to my services. Please check your internet connection and try again."
        }
        ModelError::Malformed(_) => MALFORMED,
        ModelError::EmptyContent => "Sorry, I didn't understand. Could you rephrase that?",
        ModelError::BadRequest { .. } => {
            "I apologize, but I received an invalid request format. Please try again."
        }
        ModelError::Other(_) => {
            "I think I got confused by that question. Could you try asking in a different way?"
        }
    }
}

/// Reply once every attempt has failed
pub fn exhausted(error: &ModelError) -> String {
    format!(
        "I apologize, but I'm having trouble generating a response right now (Error: {}). \
         Could you please try speaking again or asking a different question?",
        error.short_description()
    )
}
