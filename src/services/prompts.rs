//! Prompt templates per provider.

use crate::api::models::{Direction, Provider, Style};

/// Instruction text for one request. `system` is only used by chat providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    /// System and user text joined, for single-prompt providers.
    pub fn flattened(&self) -> String {
        match &self.system {
            Some(system) => format!("{}\n\n{}", system, self.user),
            None => self.user.clone(),
        }
    }
}

const CHAT_SYSTEM: &str = "You are a highly accurate Greek language translator. \
Translate between Modern Greek and Ancient Greek precisely according to the user's \
specified direction. Provide ONLY the translation and nothing else.";

const FORMAL_REGISTER_EN: &str =
    "Use an elevated, formal register in the translation.";

const FORMAL_REGISTER_EL: &str = "Χρησιμοποίησε υψηλό, επίσημο ύφος στη μετάφραση.";

fn english_direction(direction: Direction) -> &'static str {
    match direction {
        Direction::ModernToAncient => "from modern to ancient greek",
        Direction::AncientToModern => "from ancient to modern greek",
    }
}

fn greek_direction(direction: Direction) -> &'static str {
    match direction {
        Direction::ModernToAncient => "από νέα ελληνικά σε αρχαία ελληνικά",
        Direction::AncientToModern => "από αρχαία ελληνικά σε νέα ελληνικά",
    }
}

fn chat_user(direction: Direction, text: &str) -> String {
    match direction {
        Direction::ModernToAncient => format!(
            "Translate the following Modern Greek text to Ancient Greek:\n\n{}\n\nSend only the translated text.",
            text
        ),
        Direction::AncientToModern => format!(
            "Translate the following Ancient Greek text to Modern Greek:\n\n{}\n\nSend only the translated text.",
            text
        ),
    }
}

/// Build the prompt for `provider`.
pub fn render(provider: Provider, direction: Direction, style: Style, text: &str) -> Prompt {
    let formal = style == Style::FormalRegister;
    match provider {
        Provider::Gemini => {
            let mut user = format!(
                "Είσαι ένας εξειδικευμένος μεταφραστής. Μετάφρασε το παρακάτω κείμενο {}. \
                 Δώσε μόνο τη μετάφραση και τίποτα άλλο, χωρίς επιπλέον σχόλια ή επεξηγήσεις.",
                greek_direction(direction)
            );
            if formal {
                user.push(' ');
                user.push_str(FORMAL_REGISTER_EL);
            }
            user.push_str(&format!(
                "\n\nΚείμενο προς μετάφραση:\n{}\n\nΜετάφραση:",
                text
            ));
            Prompt { system: None, user }
        }
        Provider::DeepSeek | Provider::OpenAi => {
            let mut system = CHAT_SYSTEM.to_string();
            if formal {
                system.push(' ');
                system.push_str(FORMAL_REGISTER_EN);
            }
            Prompt {
                system: Some(system),
                user: chat_user(direction, text),
            }
        }
        Provider::LocalModel | Provider::Tgi => {
            let mut user = format!(
                "Translate {}. Send only the translation.",
                english_direction(direction)
            );
            if formal {
                user.push(' ');
                user.push_str(FORMAL_REGISTER_EN);
            }
            user.push_str(&format!(" Text to translate is this: \"{}\"", text));
            Prompt { system: None, user }
        }
    }
}
