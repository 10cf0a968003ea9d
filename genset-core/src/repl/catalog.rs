//! Console grammar expressed as a static AST.
//!
//! The parser, the completion engine, and `help` all walk the same tree, so
//! keywords, argument kinds, and usage strings cannot drift apart.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Start,
    Stop,
    Auto,
    Fault,
    Sim,
    Config,
    Tick,
    Advance,
    Status,
    Log,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubcommandTag {
    FaultAlternator,
    FaultRelay,
    FaultBias,
    FaultClear,
    SimTemperature,
    SimBattery,
    ConfigShow,
    ConfigExport,
    ConfigImport,
    ConfigSet,
    SetStartTemperature,
    SetHysteresis,
    SetMinRuntime,
    SetStartDebounce,
    SetStopDebounce,
    SetNoise,
    SetFast,
}

/// Kind of value an argument slot accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSpec {
    /// Decimal literal, optionally signed.
    Number,
    /// Unsigned integer.
    Count,
    /// Integer with an `ms` or `s` suffix.
    Duration,
    /// Double-quoted string.
    Quoted,
    /// `on` or `off`.
    Switch,
}

impl ValueSpec {
    /// Keywords a completion engine may offer for this slot.
    #[must_use]
    pub const fn keywords(self) -> &'static [&'static str] {
        match self {
            ValueSpec::Switch => &SWITCH_KEYWORDS,
            _ => &[],
        }
    }

    /// Placeholder rendered in usage strings.
    #[must_use]
    pub const fn placeholder(self) -> &'static str {
        match self {
            ValueSpec::Number => "<number>",
            ValueSpec::Count => "<count>",
            ValueSpec::Duration => "<duration>",
            ValueSpec::Quoted => "\"<path>\"",
            ValueSpec::Switch => "on|off",
        }
    }
}

const SWITCH_KEYWORDS: [&str; 2] = ["on", "off"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HelpTopics {
    None,
    Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub grammar: &'static Node,
    pub help: HelpTopics,
    pub summary: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    End,
    Argument {
        value: ValueSpec,
        required: bool,
        next: &'static Node,
    },
    Subcommands(&'static [SubcommandBranch]),
    Topic {
        topics: HelpTopics,
        next: &'static Node,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubcommandBranch {
    pub name: &'static str,
    pub tag: SubcommandTag,
    pub grammar: &'static Node,
}

const END: Node = Node::End;

const SWITCH: Node = Node::Argument {
    value: ValueSpec::Switch,
    required: true,
    next: &END,
};

const NUMBER: Node = Node::Argument {
    value: ValueSpec::Number,
    required: true,
    next: &END,
};

const COUNT: Node = Node::Argument {
    value: ValueSpec::Count,
    required: true,
    next: &END,
};

const OPTIONAL_COUNT: Node = Node::Argument {
    value: ValueSpec::Count,
    required: false,
    next: &END,
};

const DURATION: Node = Node::Argument {
    value: ValueSpec::Duration,
    required: true,
    next: &END,
};

const PATH: Node = Node::Argument {
    value: ValueSpec::Quoted,
    required: true,
    next: &END,
};

const FAULT_SUBCOMMANDS: [SubcommandBranch; 4] = [
    SubcommandBranch {
        name: "alternator",
        tag: SubcommandTag::FaultAlternator,
        grammar: &SWITCH,
    },
    SubcommandBranch {
        name: "relay",
        tag: SubcommandTag::FaultRelay,
        grammar: &SWITCH,
    },
    SubcommandBranch {
        name: "bias",
        tag: SubcommandTag::FaultBias,
        grammar: &NUMBER,
    },
    SubcommandBranch {
        name: "clear",
        tag: SubcommandTag::FaultClear,
        grammar: &END,
    },
];

const SIM_SUBCOMMANDS: [SubcommandBranch; 2] = [
    SubcommandBranch {
        name: "temp",
        tag: SubcommandTag::SimTemperature,
        grammar: &NUMBER,
    },
    SubcommandBranch {
        name: "battery",
        tag: SubcommandTag::SimBattery,
        grammar: &NUMBER,
    },
];

const CONFIG_KEYS: [SubcommandBranch; 7] = [
    SubcommandBranch {
        name: "start-temp",
        tag: SubcommandTag::SetStartTemperature,
        grammar: &NUMBER,
    },
    SubcommandBranch {
        name: "hysteresis",
        tag: SubcommandTag::SetHysteresis,
        grammar: &NUMBER,
    },
    SubcommandBranch {
        name: "min-runtime",
        tag: SubcommandTag::SetMinRuntime,
        grammar: &COUNT,
    },
    SubcommandBranch {
        name: "start-debounce",
        tag: SubcommandTag::SetStartDebounce,
        grammar: &COUNT,
    },
    SubcommandBranch {
        name: "stop-debounce",
        tag: SubcommandTag::SetStopDebounce,
        grammar: &COUNT,
    },
    SubcommandBranch {
        name: "noise",
        tag: SubcommandTag::SetNoise,
        grammar: &SWITCH,
    },
    SubcommandBranch {
        name: "fast",
        tag: SubcommandTag::SetFast,
        grammar: &SWITCH,
    },
];

const CONFIG_SET_GRAMMAR: Node = Node::Subcommands(&CONFIG_KEYS);

const CONFIG_SUBCOMMANDS: [SubcommandBranch; 4] = [
    SubcommandBranch {
        name: "show",
        tag: SubcommandTag::ConfigShow,
        grammar: &END,
    },
    SubcommandBranch {
        name: "export",
        tag: SubcommandTag::ConfigExport,
        grammar: &PATH,
    },
    SubcommandBranch {
        name: "import",
        tag: SubcommandTag::ConfigImport,
        grammar: &PATH,
    },
    SubcommandBranch {
        name: "set",
        tag: SubcommandTag::ConfigSet,
        grammar: &CONFIG_SET_GRAMMAR,
    },
];

const FAULT_GRAMMAR: Node = Node::Subcommands(&FAULT_SUBCOMMANDS);
const SIM_GRAMMAR: Node = Node::Subcommands(&SIM_SUBCOMMANDS);
const CONFIG_GRAMMAR: Node = Node::Subcommands(&CONFIG_SUBCOMMANDS);

const HELP_GRAMMAR: Node = Node::Topic {
    topics: HelpTopics::Commands,
    next: &END,
};

const COMMANDS: [CommandSpec; 11] = [
    CommandSpec {
        name: "start",
        tag: CommandTag::Start,
        grammar: &END,
        help: HelpTopics::None,
        summary: "begin a start sequence",
    },
    CommandSpec {
        name: "stop",
        tag: CommandTag::Stop,
        grammar: &END,
        help: HelpTopics::None,
        summary: "stop the engine or abort a start",
    },
    CommandSpec {
        name: "auto",
        tag: CommandTag::Auto,
        grammar: &SWITCH,
        help: HelpTopics::None,
        summary: "enable or suspend automatic start/stop",
    },
    CommandSpec {
        name: "fault",
        tag: CommandTag::Fault,
        grammar: &FAULT_GRAMMAR,
        help: HelpTopics::None,
        summary: "inject or clear simulated faults",
    },
    CommandSpec {
        name: "sim",
        tag: CommandTag::Sim,
        grammar: &SIM_GRAMMAR,
        help: HelpTopics::None,
        summary: "set the simulated temperature or battery voltage",
    },
    CommandSpec {
        name: "config",
        tag: CommandTag::Config,
        grammar: &CONFIG_GRAMMAR,
        help: HelpTopics::None,
        summary: "show, change, export or import the configuration",
    },
    CommandSpec {
        name: "tick",
        tag: CommandTag::Tick,
        grammar: &OPTIONAL_COUNT,
        help: HelpTopics::None,
        summary: "advance the sequencer by whole ticks",
    },
    CommandSpec {
        name: "advance",
        tag: CommandTag::Advance,
        grammar: &DURATION,
        help: HelpTopics::None,
        summary: "advance simulated time",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        grammar: &END,
        help: HelpTopics::None,
        summary: "print the engine status",
    },
    CommandSpec {
        name: "log",
        tag: CommandTag::Log,
        grammar: &OPTIONAL_COUNT,
        help: HelpTopics::None,
        summary: "print recent events, newest first",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        grammar: &HELP_GRAMMAR,
        help: HelpTopics::Commands,
        summary: "list commands or describe one",
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Looks up a command by its tag.
#[must_use]
pub fn command(tag: CommandTag) -> &'static CommandSpec {
    match tag {
        CommandTag::Start => &COMMANDS[0],
        CommandTag::Stop => &COMMANDS[1],
        CommandTag::Auto => &COMMANDS[2],
        CommandTag::Fault => &COMMANDS[3],
        CommandTag::Sim => &COMMANDS[4],
        CommandTag::Config => &COMMANDS[5],
        CommandTag::Tick => &COMMANDS[6],
        CommandTag::Advance => &COMMANDS[7],
        CommandTag::Status => &COMMANDS[8],
        CommandTag::Log => &COMMANDS[9],
        CommandTag::Help => &COMMANDS[10],
    }
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Finds a subcommand branch by name (case insensitive).
#[must_use]
pub fn find_branch(
    branches: &'static [SubcommandBranch],
    name: &str,
) -> Option<&'static SubcommandBranch> {
    branches
        .iter()
        .find(|branch| branch.name.eq_ignore_ascii_case(name))
}

/// Renders every usage line of `spec`, one per grammar path.
#[must_use]
pub fn usage_lines(spec: &CommandSpec) -> Vec<String> {
    let mut lines = Vec::new();
    collect_usage(spec.grammar, String::from(spec.name), &mut lines);
    lines
}

fn collect_usage(node: &'static Node, prefix: String, lines: &mut Vec<String>) {
    match node {
        Node::End => lines.push(prefix),
        Node::Argument {
            value,
            required,
            next,
        } => {
            let placeholder = if *required {
                format!("{prefix} {}", value.placeholder())
            } else {
                format!("{prefix} [{}]", value.placeholder())
            };
            collect_usage(next, placeholder, lines);
        }
        Node::Subcommands(branches) => {
            for branch in *branches {
                collect_usage(branch.grammar, format!("{prefix} {}", branch.name), lines);
            }
        }
        Node::Topic { next, .. } => collect_usage(next, format!("{prefix} [topic]"), lines),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_index_their_own_entries() {
        for spec in commands() {
            assert_eq!(command(spec.tag).name, spec.name);
        }
    }

    #[test]
    fn usage_expands_nested_subcommands() {
        let lines = usage_lines(command(CommandTag::Config));
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "config show");
        assert_eq!(lines[1], "config export \"<path>\"");
        assert!(lines.contains(&String::from("config set min-runtime <count>")));
        assert!(lines.contains(&String::from("config set noise on|off")));
    }

    #[test]
    fn optional_arguments_render_in_brackets() {
        assert_eq!(usage_lines(command(CommandTag::Tick)), ["tick [<count>]"]);
        assert_eq!(usage_lines(command(CommandTag::Help)), ["help [topic]"]);
    }
}
