use std::fmt;

/// A decoded request line: a command name plus its positional arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// The command produced by blank input.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The known command this name refers to, if any.
    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::from_name(&self.name)
    }
}

/// Every command the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SignUp,
    LogIn,
    List,
    Deposit,
    Buy,
    Sell,
    Summary,
    Trends,
    LogOut,
    Exit,
}

/// Which session state a command may run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    /// Runs with or without an identity.
    None,
    /// The session must not be logged in.
    MustBeAbsent,
    /// The session must be logged in.
    MustBePresent,
}

impl CommandKind {
    pub const ALL: [CommandKind; 10] = [
        CommandKind::SignUp,
        CommandKind::LogIn,
        CommandKind::List,
        CommandKind::Deposit,
        CommandKind::Buy,
        CommandKind::Sell,
        CommandKind::Summary,
        CommandKind::Trends,
        CommandKind::LogOut,
        CommandKind::Exit,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// The wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::SignUp => "signup",
            CommandKind::LogIn => "login",
            CommandKind::List => "list",
            CommandKind::Deposit => "deposit",
            CommandKind::Buy => "buy",
            CommandKind::Sell => "sell",
            CommandKind::Summary => "summary",
            CommandKind::Trends => "trends",
            CommandKind::LogOut => "logout",
            CommandKind::Exit => "exit",
        }
    }

    pub fn auth(&self) -> AuthRequirement {
        match self {
            CommandKind::SignUp | CommandKind::LogIn => AuthRequirement::MustBeAbsent,
            CommandKind::List | CommandKind::Exit => AuthRequirement::None,
            CommandKind::Deposit
            | CommandKind::Buy
            | CommandKind::Sell
            | CommandKind::Summary
            | CommandKind::Trends
            | CommandKind::LogOut => AuthRequirement::MustBePresent,
        }
    }

    /// Exact number of arguments the command takes.
    pub fn arity(&self) -> usize {
        match self {
            CommandKind::SignUp | CommandKind::LogIn | CommandKind::Buy => 2,
            CommandKind::Deposit | CommandKind::Sell => 1,
            CommandKind::List
            | CommandKind::Summary
            | CommandKind::Trends
            | CommandKind::LogOut
            | CommandKind::Exit => 0,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
