use crate::models::ChatMessage;

pub const NOT_FOOD_TOKEN: &str = "NOT_FOOD";

const CLASSIFIER_PROMPT: &str = "You are an image classifier. Determine if the description of an image \
contains edible food. Reply ONLY with: FOOD or NOT_FOOD.";

const NUTRITION_PROMPT: &str = "You are a nutrition expert. Analyze the food described and provide \
nutrition data as exactly one JSON object in this format: \
{ \"calories\": \"...\", \"protein\": \"...\", \"carbs\": \"...\", \"fat\": \"...\", \"score\": 0-100 } \
where score is an integer health score from 0 (avoid) to 100 (very healthy).";

const ASSISTANT_PROMPT: &str = "You are a friendly AI nutrition assistant.\n\
Give short, clear, beginner-friendly healthy food advice only.\n\
Never give medical diagnosis.\n\
Always end with one simple healthy tip.";

pub const GREETING: &str =
    "Hi! I'm your AI Health Assistant. Ask me anything about food, calories, or healthy eating.";

pub const CHAT_FALLBACK: &str =
    "I'm having trouble connecting to the AI right now. Please try again in a moment.";

pub fn classification_messages(description: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CLASSIFIER_PROMPT),
        ChatMessage::user(format!(
            "Image filename: {}. Does this sound like it contains edible food?",
            description
        )),
    ]
}

pub fn nutrition_messages(description: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(NUTRITION_PROMPT),
        ChatMessage::user(format!("Analyze this food: {}", description)),
    ]
}

/// System prompt for the assistant, with the last scanned item appended when known.
pub fn assistant_system_prompt(last_scanned: Option<&str>) -> String {
    let mut content = ASSISTANT_PROMPT.to_string();
    if let Some(item) = last_scanned.map(str::trim).filter(|s| !s.is_empty()) {
        content.push_str(&format!(
            "\n\nContext: The user recently scanned \"{}\". Tailor advice to this food if relevant.",
            item
        ));
    }
    content
}

/// system + history + latest user turn, in that order.
pub fn assistant_messages(
    history: &[ChatMessage],
    new_message: &str,
    last_scanned: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(assistant_system_prompt(last_scanned)));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(new_message));
    messages
}
