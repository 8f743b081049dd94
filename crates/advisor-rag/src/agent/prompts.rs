//! Fixed prompts and canned messages for the agent hierarchy.

use crate::language::Language;
use crate::types::Program;

pub fn greeting(language: Language) -> &'static str {
    match language {
        Language::English => {
            "Hello! I'm the program advisor for our executive-education portfolio. \
             Ask me anything about admission, curriculum, fees, or schedules."
        }
        Language::German => {
            "Guten Tag! Ich bin der Programmberater für unser Weiterbildungsangebot. \
             Fragen Sie mich gerne zu Zulassung, Curriculum, Gebühren oder Terminen."
        }
    }
}

pub fn clarification_message(language: Language) -> &'static str {
    match language {
        Language::English => {
            "I didn't catch that — could you rephrase your question about our programs?"
        }
        Language::German => {
            "Das habe ich leider nicht verstanden — könnten Sie Ihre Frage zu unseren \
             Programmen anders formulieren?"
        }
    }
}

/// The fixed apologetic message substituted for any unrecovered turn failure.
pub fn apologetic_message(language: Language) -> &'static str {
    match language {
        Language::English => {
            "I'm sorry, something went wrong on my side while answering. Please try \
             again, or ask to speak with one of our advisors."
        }
        Language::German => {
            "Es tut mir leid, bei der Beantwortung ist etwas schiefgelaufen. Bitte \
             versuchen Sie es erneut oder wenden Sie sich an unsere Berater."
        }
    }
}

/// Per-turn directive pinning the response language, sent as its own system
/// message so it wins over whatever language later user messages arrive in.
pub fn language_directive(language: Language) -> String {
    format!(
        "Respond in {} only, regardless of the language of the user's message.",
        language.name()
    )
}

/// System prompt for the lead agent. The stricter routing variant: at most
/// one sub-agent tool call per turn.
pub fn lead_system_prompt(programs: &[Program]) -> String {
    let program_list = programs
        .iter()
        .map(|p| format!("- {} (tool: {})", p.display_name(), sub_agent_tool_id(*p)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are the lead advisor for a university's executive-education portfolio.\n\
         \n\
         Programs and their specialist tools:\n{program_list}\n\
         \n\
         Rules:\n\
         - Answer greetings and small talk directly, without any tool call.\n\
         - For a program-specific question, call the matching specialist tool. \
           Call AT MOST ONE specialist tool per turn, then synthesize its answer \
           for the user in your own words.\n\
         - If a question spans several programs, pick the most relevant specialist \
           this turn and offer to cover the others next.\n\
         - Never invent program facts the specialists did not provide.\n\
         - Keep answers concise and conversational; no markdown tables."
    )
}

/// System prompt for a program sub-agent: one retrieval call, answers built
/// exclusively from retrieved text.
pub fn sub_system_prompt(program: Program) -> String {
    format!(
        "You are the specialist for the {} program.\n\
         \n\
         Rules:\n\
         - Call the retrieve_context tool EXACTLY ONCE to fetch program material, \
           then answer from it.\n\
         - Use ONLY the retrieved text. If it does not contain the answer, say so \
           plainly instead of guessing.\n\
         - Quote concrete facts (fees, dates, requirements) exactly as retrieved.",
        program.display_name()
    )
}

pub fn sub_agent_tool_id(program: Program) -> String {
    format!("ask_{}", program.id())
}
