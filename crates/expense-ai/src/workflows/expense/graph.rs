use super::state::{ControlSignal, RunState};
use serde::Serialize;

/// Nodes of the transition graph. `Processing` covers extraction,
/// validation and reporting; `Action` covers notification and decides
/// whether to loop back or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Processing,
    Action,
    Exit,
}

impl Node {
    pub const INITIAL: Node = Node::Processing;

    pub const fn label(self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Action => "Action",
            Self::Exit => "Exit",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exit)
    }
}

/// Pick the node after `from`. The only conditional edge leaves `Action`
/// and follows the control signal it just wrote.
pub fn next_node(from: Node, state: &RunState) -> Node {
    match from {
        Node::Processing => Node::Action,
        Node::Action => match state.control_signal() {
            Some(ControlSignal::Continue) => Node::Processing,
            Some(ControlSignal::Terminate) | None => Node::Exit,
        },
        Node::Exit => Node::Exit,
    }
}

/// Mermaid flowchart of the graph.
pub fn mermaid() -> String {
    [
        "flowchart TD",
        "    start((start)) --> Processing",
        "    Processing --> Action",
        "    Action -. Continue .-> Processing",
        "    Action -. Terminate .-> Exit",
        "    Exit --> stop((end))",
    ]
    .join("\n")
}
