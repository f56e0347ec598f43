#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const VALUE_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "mode",
        action: "set_mode",
    },
    CommandSpec {
        command: "ratio",
        action: "set_ratio",
    },
    CommandSpec {
        command: "hq",
        action: "set_quality",
    },
];

pub(crate) const PATH_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "attach",
    action: "attach",
}];

pub(crate) const INDEX_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "like",
    action: "like",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "detach",
        action: "detach",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "history",
        action: "history",
    },
    CommandSpec {
        command: "memory",
        action: "memory",
    },
    CommandSpec {
        command: "modes",
        action: "list_modes",
    },
    CommandSpec {
        command: "config",
        action: "show_config",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/mode",
    "/modes",
    "/ratio",
    "/hq",
    "/config",
    "/attach",
    "/detach",
    "/like",
    "/reset",
    "/history",
    "/memory",
    "/help",
    "/quit",
];
