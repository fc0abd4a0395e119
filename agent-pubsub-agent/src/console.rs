//! Terminal rendering of display events

use crate::display::{tool_result_text, DisplayEvent, DisplaySink};
use console::style;

/// Renders display events to stdout with light styling
#[derive(Debug, Clone, Default)]
pub struct ConsoleRenderer {
    /// Agent name shown in the assistant header
    agent_name: Option<String>,
}

impl ConsoleRenderer {
    pub fn new(agent_name: Option<String>) -> Self {
        Self { agent_name }
    }

    /// Text lines for an event, without styling
    pub fn format(&self, event: &DisplayEvent) -> Vec<String> {
        match event {
            DisplayEvent::AssistantMessage {
                content,
                highlighted_tool,
            } => {
                let name = self.agent_name.as_deref().unwrap_or("assistant");
                let mut header = format!("[{}]", name);
                if let Some(tool) = highlighted_tool {
                    header.push_str(&format!(" ({})", tool));
                }
                vec![header, content.clone()]
            }
            DisplayEvent::UserMessage {
                content,
                model,
                chat_turn,
            } => {
                let mut header = format!("[user] turn {}", chat_turn);
                if let Some(model) = model {
                    header.push_str(&format!(" · {}", model));
                }
                vec![header, content.clone()]
            }
            DisplayEvent::ToolCall {
                tool_name,
                arguments,
            } => vec![
                format!("[tool call] {}", tool_name),
                arguments.to_string(),
            ],
            DisplayEvent::ToolResult {
                tool_name,
                result,
                is_error,
            } => {
                let label = if *is_error { "tool error" } else { "tool result" };
                let header = match tool_name {
                    Some(tool) => format!("[{}] {}", label, tool),
                    None => format!("[{}]", label),
                };
                vec![header, tool_result_text(result)]
            }
        }
    }
}

impl DisplaySink for ConsoleRenderer {
    fn render(&self, event: &DisplayEvent) {
        let lines = self.format(event);
        let Some((header, body)) = lines.split_first() else {
            return;
        };

        let header = match event {
            DisplayEvent::AssistantMessage { .. } => style(header).bold().cyan(),
            DisplayEvent::UserMessage { .. } => style(header).bold().blue(),
            DisplayEvent::ToolCall { .. } => style(header).magenta(),
            DisplayEvent::ToolResult { is_error: true, .. } => style(header).red(),
            DisplayEvent::ToolResult { .. } => style(header).green(),
        };
        println!("{}", header);
        for line in body {
            println!("{}", line);
        }
        println!();
    }
}
