//! `help` RPC method: lists the methods this server exposes, or describes one.

const COMMANDS: &[(&str, &str)] = &[
    ("getbalance", "Returns the wallet's confirmed and pending balance."),
    ("getwalletinfo", "Returns wallet state information (locked/unlocked, sync height)."),
    ("listunspent", "Lists spendable outputs, optionally restricted to one account."),
    ("listaddresses", "Lists the sub-addresses this wallet has generated."),
    ("getnewaddress", "Issues a fresh never-before-used receiving sub-address."),
    ("sendtoaddress", "Builds, broadcasts and records a confidential spend."),
    ("getoperationstatus", "Returns the status of one or more async send operations."),
    ("listoperationids", "Lists the ids of known async send operations."),
    ("gettransaction", "Returns details about an in-wallet transaction."),
    ("lockwallet", "Removes the wallet decryption key from memory."),
    ("unlockwallet", "Loads the wallet decryption key into memory."),
    ("validateaddress", "Checks whether a string is a valid address for this network."),
    ("stop", "Requests that the wallet process shut down."),
    ("help", "List all commands, or get help for a specified command."),
];

pub(crate) fn call(command: Option<&str>) -> String {
    if let Some(command) = command {
        match COMMANDS.iter().find(|(name, _)| *name == command) {
            None => format!("help: unknown command: {command}\n"),
            Some((name, help_text)) => format!("{name}\n\n{help_text}\n"),
        }
    } else {
        let mut commands = COMMANDS.iter().map(|(name, _)| *name).collect::<Vec<_>>();
        commands.sort_unstable();

        let mut ret = String::new();
        for name in commands {
            ret.push_str(name);
            ret.push('\n');
        }
        ret
    }
}
