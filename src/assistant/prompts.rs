//! Prompt text and request constants for the vision assistant.

/// Default Gemini model when settings have none.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Sent with every fresh screenshot. Each new image starts a new
/// conversation, so the instruction only needs to cover one capture.
pub const SYSTEM_INSTRUCTION: &str = r#"You are a concise on-screen assistant. The user sends you a screenshot of whatever is currently on their screen and then asks follow-up questions about it.

Rules:
1. A new screenshot starts a new conversation. Forget anything from earlier screenshots.
2. Start by describing what is on screen in two or three sentences, then point out anything that looks actionable.
3. Keep answers short, specific and grounded in what is visible.
4. When there are obvious next questions, end your reply with them in this exact format:
   [OPTIONS: First option | Second option | Third option]
   Leave the tag out when nothing fits.
5. When the user sends the exact text of one of your options, answer that option directly."#;

/// Text part that accompanies the image in the first turn.
pub const IMAGE_CAPTION: &str = "[Attached image for analysis]";

/// Minimal prompt used to check that the credential and model work.
pub const HEALTH_CHECK_PROMPT: &str = "Ping";

pub const MAX_OUTPUT_TOKENS: u32 = 1024;
