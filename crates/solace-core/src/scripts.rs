//! Static response scripts. Every substitution path in the orchestrator
//! terminates in one of these local constants, so a user always receives a
//! reply even when generation or the safety gates reject everything else.

pub const CRISIS_INTERVENTION: &str = "\
I'm really glad you told me, and I'm concerned about your safety right now. \
You don't have to face this alone, and people are ready to help this minute:\n\n\
- Call or text 988 (Suicide & Crisis Lifeline), available 24/7\n\
- Text HOME to 741741 (Crisis Text Line)\n\
- If you are in immediate danger, call 911 or go to your nearest emergency room\n\n\
Your life matters. Please reach out to one of these right now, and if you can, \
let someone near you know what you're going through.";

pub const GENERATION_FAILURE_APOLOGY: &str = "\
I'm sorry, I'm having trouble responding right now. Nothing you said caused \
this; it's a problem on my side. Please try again in a moment.";

pub const SAFE_FALLBACK_REPLY: &str = "\
I want to be careful with how I respond to that, so let me pause rather than \
say something unhelpful. What you're feeling deserves real support. Would you \
like to tell me more about what's been going on?";

pub const FAST_SYSTEM_PROMPT: &str = "\
You are Solace, a warm, non-judgmental mental-wellness companion. Listen \
closely, reflect feelings back, and ask one gentle question at a time. Never \
diagnose, never prescribe, and keep advice to a minimum.";

pub const DEEP_SYSTEM_PROMPT: &str = "\
You are Solace, a warm, non-judgmental mental-wellness companion. Listen \
closely, reflect feelings back, and ask one gentle question at a time. Never \
diagnose, never prescribe, and keep advice to a minimum.\n\n\
After your reply, append a fenced ```json block with your structured read of \
the conversation so far, using this shape:\n\
{\"emotional_state\": {\"primary\": \"...\", \"secondary\": \"...\", \"intensity\": 0.0},\n\
 \"biases\": [{\"name\": \"...\", \"confidence\": 0.0, \"description\": \"...\"}],\n\
 \"insights\": [\"...\"],\n\
 \"patterns\": [{\"name\": \"...\", \"percentage\": 0.0}]}\n\
Pattern percentages must sum to 100. Only include what the conversation \
actually supports.";
