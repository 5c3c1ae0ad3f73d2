//! Privileged channel commands.
//!
//! Any PRIVMSG starting with `.` is treated as a possible admin command. The
//! sender's nick is resolved to an account on a task of its own, checked
//! against the durable admin set, and only then is the command run:
//!
//! - `.addadmin <account>` / `.deladmin <account>` edit the set
//! - `.raw <line>` sends an arbitrary IRC line
//!
//! Senders who are not admins, or whose account cannot be established, get
//! no reply at all.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use sdbot_proto::{Command, Message};
use tracing::{debug, info, warn};

use crate::config::NickServConfig;
use crate::identity::IdentityResolver;
use crate::network::{Client, Handler};
use crate::persist::State;

/// Accounts allowed to run admin commands.
pub type Admins = BTreeSet<String>;

static ADMIN_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.(addadmin|deladmin|raw)\s+(.*)$").expect("admin command pattern is valid")
});

const ADDED: &str = "Added user successfully";
const REMOVED: &str = "Removed user successfully";
const UNPARSEABLE: &str = "Could not parse, are you sure you know the irc protocol?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Add(String),
    Del(String),
    Raw(String),
}

impl AdminCommand {
    /// Recognize an admin command in message text.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = ADMIN_COMMAND.captures(text)?;
        let arg = caps.get(2)?.as_str();
        let account = arg.trim();

        match caps.get(1)?.as_str() {
            "addadmin" if !account.is_empty() => Some(Self::Add(account.to_owned())),
            "deladmin" if !account.is_empty() => Some(Self::Del(account.to_owned())),
            "raw" => Some(Self::Raw(arg.to_owned())),
            _ => None,
        }
    }
}

/// The bot's handler: identity tracking first, then admin commands.
pub struct Bot {
    identity: Arc<IdentityResolver>,
    admins: Arc<State<Admins>>,
    nickserv_password: Option<String>,
}

impl Bot {
    pub fn new(
        identity: Arc<IdentityResolver>,
        admins: Arc<State<Admins>>,
        nickserv: &NickServConfig,
    ) -> Self {
        Self {
            identity,
            admins,
            nickserv_password: nickserv.identify_password().map(str::to_owned),
        }
    }
}

#[async_trait]
impl Handler for Bot {
    async fn handle(&self, client: &Client, msg: &Message) -> bool {
        if self.identity.handle(client, msg).await {
            return true;
        }

        let Command::PRIVMSG(_, text) = &msg.command else {
            return false;
        };
        if !text.starts_with('.') || msg.source_nickname().is_none() {
            return false;
        }

        // Resolution can take a WHOIS round trip; keep the read pump moving.
        tokio::spawn(run_admin(
            Arc::clone(&self.identity),
            Arc::clone(&self.admins),
            client.clone(),
            msg.clone(),
        ));
        true
    }

    async fn registered(&self, client: &Client) {
        if let Some(password) = &self.nickserv_password {
            let identify = Message::privmsg("NickServ", format!("identify {password}"));
            if let Err(e) = client.write(identify).await {
                warn!(error = %e, "Could not identify with NickServ");
                return;
            }
        }
        if let Err(e) = client.write(Message::mode(client.nick(), &["+R"])).await {
            warn!(error = %e, "Could not set user mode");
        }
    }

    fn disconnected(&self) {
        self.identity.clear();
    }
}

async fn run_admin(
    identity: Arc<IdentityResolver>,
    admins: Arc<State<Admins>>,
    client: Client,
    msg: Message,
) {
    let Some(nick) = msg.source_nickname() else {
        return;
    };
    let Some(account) = identity.resolve(&client, nick).await else {
        debug!(nick = %nick, "No account for sender, ignoring command");
        return;
    };
    if !admins.lock().contains(&account) {
        debug!(nick = %nick, account = %account, "Sender is not an admin");
        return;
    }

    let Command::PRIVMSG(_, text) = &msg.command else {
        return;
    };
    let Some(command) = AdminCommand::parse(text) else {
        return;
    };
    execute(&admins, &client, &msg, &account, command).await;
}

/// Run an authorized command and reply to its sender.
async fn execute(
    admins: &State<Admins>,
    client: &Client,
    msg: &Message,
    by: &str,
    command: AdminCommand,
) {
    let reply = match command {
        AdminCommand::Add(account) => {
            let mut set = admins.lock();
            set.insert(account.clone());
            if let Err(e) = set.save() {
                warn!(error = %e, "Could not save admin set");
                return;
            }
            info!(account = %account, by = %by, "Admin added");
            ADDED
        }
        AdminCommand::Del(account) => {
            let mut set = admins.lock();
            set.remove(&account);
            if let Err(e) = set.save() {
                warn!(error = %e, "Could not save admin set");
                return;
            }
            info!(account = %account, by = %by, "Admin removed");
            REMOVED
        }
        AdminCommand::Raw(line) => match line.parse::<Message>() {
            Ok(raw) => {
                info!(line = %raw, by = %by, "Sending raw line");
                if let Err(e) = client.write(raw).await {
                    warn!(error = %e, "Could not send raw line");
                }
                return;
            }
            Err(e) => {
                debug!(error = %e, "Unparseable raw line");
                UNPARSEABLE
            }
        },
    };

    if let Err(e) = client.notice(msg, reply).await {
        warn!(error = %e, "Could not reply to admin");
    }
}
