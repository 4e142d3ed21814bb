//! Translation oracle: prompts a model for a function's Rust translation and
//! decodes the reply.
//!
//! Replies must carry `<FUNC>` and `<WRAPPER>` sections (`<IMPORTS>` is
//! optional). Malformed replies are retried here and never reach the caller;
//! model unavailability is propagated.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{Conversation, FunctionDescriptor, Message, Translation, ValidationResult};
use crate::services::models::{ModelError, SamplingParams, TranslationModel};

pub const SYSTEM_PROMPT: &str = "You are an intelligent code assistant";

const FORMAT_REMINDER: &str = "Remember to follow the same format with <IMPORTS></IMPORTS>, <FUNC></FUNC>, and <WRAPPER></WRAPPER> tags.";

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Translation model unavailable: {0}")]
    Unavailable(String),
    #[error("Function `{0}` has no extracted body to translate")]
    MissingBody(String),
    #[error("Repair requested without a failed validation")]
    NothingToRepair,
    #[error("Repair requested before any translation")]
    EmptyConversation,
}

impl From<ModelError> for OracleError {
    fn from(e: ModelError) -> Self {
        OracleError::Unavailable(e.to_string())
    }
}

/// A reply lacking a required section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response does not contain a <{0}> section")]
pub struct MalformedResponse(pub &'static str);

pub struct Oracle {
    model: Box<dyn TranslationModel>,
    params: SamplingParams,
    max_malformed: u32,
}

impl Oracle {
    pub fn new(model: Box<dyn TranslationModel>, max_malformed: u32) -> Self {
        Self { model, params: SamplingParams::default(), max_malformed }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Start a fresh conversation for `func` and return its first translation.
    pub fn translate(
        &self,
        func: &FunctionDescriptor,
    ) -> Result<(Translation, Conversation), OracleError> {
        let body = func.body.as_deref().ok_or_else(|| OracleError::MissingBody(func.name.clone()))?;
        let mut conversation = Conversation::new();
        conversation.push(Message::system(SYSTEM_PROMPT));
        conversation.push(Message::user(translation_prompt(&func.name, body).trim()));
        info!(function = %func.name, "requesting translation");
        self.request(conversation)
    }

    /// Continue `conversation` with the failure and ask for a new translation.
    pub fn repair(
        &self,
        mut conversation: Conversation,
        failure: &ValidationResult,
    ) -> Result<(Translation, Conversation), OracleError> {
        if conversation.is_empty() {
            return Err(OracleError::EmptyConversation);
        }
        let prompt = repair_prompt(failure).ok_or(OracleError::NothingToRepair)?;
        conversation.push(Message::user(prompt));
        info!("requesting repair");
        self.request(conversation)
    }

    fn request(
        &self,
        mut conversation: Conversation,
    ) -> Result<(Translation, Conversation), OracleError> {
        let mut malformed = 0;
        loop {
            let replies = self.model.generate(&conversation, &self.params)?;
            let reply = replies.into_iter().next().unwrap_or_default();
            debug!(response = %reply, "model response received");
            conversation.push(Message::assistant(reply.as_str()));

            match parse_response(&reply) {
                Ok(translation) => return Ok((translation, conversation)),
                Err(missing) => {
                    malformed += 1;
                    warn!(malformed, error = %missing, "malformed model response; asking again");
                    if malformed > self.max_malformed {
                        return Err(OracleError::Unavailable(format!(
                            "model returned {malformed} malformed responses in a row"
                        )));
                    }
                    conversation.push(Message::user(format!(
                        "Your response did not contain the <{tag}></{tag}> section. {FORMAT_REMINDER}",
                        tag = missing.0
                    )));
                }
            }
        }
    }
}

/// First-turn prompt for translating `name`.
pub fn translation_prompt(name: &str, body: &str) -> String {
    format!(
        r#"Translate the following C function to idiomatic Rust:
```c
{body}
```
As far as possible, use only safe Rust. Avoid raw pointers and unsafe function calls.
You can assume that all the structures and global variables already have definitions in Rust, and you do not need to redefine them.
Do not use any dummy code like "// Full implementation goes here", etc. All the code you write will be substituted directly into the codebase without a human reviewing it. So it should be functional and complete.
Feel free to change the function signature and modify the function body as needed.
If you need imports, you can add them in the <IMPORTS>...</IMPORTS> section. Do not provide them along with the function body.

Also provide a wrapper function that calls this function.
The wrapper function should have the *same* arguments and return type as the C function, except with C types replaced with their corresponding libc crate types.
For example, replace `int` with `libc::c_int`, `char*` with `*mut libc::c_char`, etc.
Also remember to use `#[no_mangle]` and `pub extern "C" fn ...` for the wrapper function.

The name of the Rust function should be `{name}_rust` and the wrapper function should be `{name}`.

Follow this format:

<IMPORTS>
Any imports you need for {name}_rust and {name}
</IMPORTS>

<FUNC>
fn {name}_rust ...
</FUNC>

<WRAPPER>
#[no_mangle]
pub extern "C" fn {name} ...
</WRAPPER>
"#
    )
}

/// Follow-up prompt describing a failed attempt; `None` on success.
pub fn repair_prompt(failure: &ValidationResult) -> Option<String> {
    let lead = match failure {
        ValidationResult::Success => return None,
        ValidationResult::CompileError(_) => "The translation generated the following compile error:",
        ValidationResult::TestFailure(_) => "The translation failed tests. This was the command output:",
    };
    Some(format!(
        "{lead}\n{}\nPlease re-generate the translation of the function, wrapper function, and imports. {FORMAT_REMINDER}",
        failure.message()
    ))
}

/// Decode a model reply into a `Translation`.
pub fn parse_response(response: &str) -> Result<Translation, MalformedResponse> {
    let func = section(response, "FUNC").ok_or(MalformedResponse("FUNC"))?;
    let wrapper = section(response, "WRAPPER").ok_or(MalformedResponse("WRAPPER"))?;
    let imports = section(response, "IMPORTS").unwrap_or_default();
    Ok(Translation { func, wrapper, imports })
}

/// Text between `<TAG>` (at the end of a line) and `</TAG>`, with code fences
/// removed. An unclosed section runs to the end of the reply.
fn section(response: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let mut search = 0;
    let start = loop {
        let at = search + response[search..].find(&open)?;
        let after = at + open.len();
        let rest = &response[after..];
        if let Some(stripped) = rest.strip_prefix("\r\n") {
            break response.len() - stripped.len();
        }
        if let Some(stripped) = rest.strip_prefix('\n') {
            break response.len() - stripped.len();
        }
        search = after;
    };

    let body = &response[start..];
    let body = body.find(&close).map(|end| &body[..end]).unwrap_or(body);
    Some(body.replace("```rust", "").replace("```", "").trim().to_string())
}
