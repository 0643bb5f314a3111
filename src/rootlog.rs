use anyhow::{Result, bail};

use crate::data::pkg_id_to_name;

// The log shapes this understands come in two dialects. The older tool
// wraps long package names onto a second line and prints sizes as
// B/k/M/G; the newer one quotes NVRs in "already installed" notices,
// prints sizes as B/KiB/MiB/GiB, and sometimes drops an "already
// installed" notice into the middle of the install table.
const SIZE_UNITS: [&str; 7] = ["B", "KiB", "k", "MiB", "M", "GiB", "G"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the builddep invocation; nothing matters yet.
    Scanning,
    /// Between the builddep invocation and the resolved-transaction marker;
    /// "already installed" notices name direct build dependencies.
    Preamble,
    /// Waiting for the bare "Installing:" table header.
    Header,
    /// Inside the install table, decoding one package name per line.
    List,
}

fn name_from_token(token: &str) -> String {
    pkg_id_to_name(token.trim_matches('"')).to_string()
}

/// Extracts the directly installed build-dependency package names from one
/// build log. Returns names in first-seen order; duplicates are allowed.
pub fn get_build_deps_from_root_log(root_log: &str) -> Result<Vec<String>> {
    let mut required_pkgs: Vec<String> = Vec::new();
    let mut state = State::Scanning;

    for line in root_log.lines() {
        match state {
            State::Scanning => {
                if line.contains("'builddep', '--installroot'") {
                    state = State::Preamble;
                }
            }

            State::Preamble => {
                if line.contains("is already installed.") {
                    let tokens: Vec<&str> = line.split_whitespace().collect();
                    if let Some(token) = tokens.get(3) {
                        required_pkgs.push(name_from_token(token));
                    }
                } else if line.contains("Dependencies resolved.")
                    || line.contains("Repositories loaded.")
                {
                    state = State::Header;
                }
            }

            State::Header => {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                if line.contains("is already installed.") {
                    if let Some(already_idx) = tokens.iter().position(|t| *t == "already")
                        && already_idx >= 2
                        && let Some(token) = tokens.get(already_idx - 2)
                    {
                        required_pkgs.push(name_from_token(token));
                    }
                }
                // The transaction-summary dialect also prints
                // "Installing: NN packages"; only the bare header counts.
                if line.contains("Installing:") && tokens.len() == 3 {
                    state = State::List;
                }
            }

            State::List => {
                let tokens: Vec<&str> = line.split_whitespace().collect();

                if line.contains("Installing dependencies:") || line.contains("Transaction Summary")
                {
                    state = State::Header;
                } else if tokens.get(2) == Some(&"Package")
                    && tokens.last() == Some(&"installed.")
                {
                    if let Some(token) = tokens.get(3) {
                        required_pkgs.push(name_from_token(token));
                    }
                } else {
                    match tokens.len() {
                        10 | 11 => {
                            // An "already installed" notice merged into a
                            // table line; record both names.
                            let Some(already_idx) =
                                tokens.iter().position(|t| *t == "already")
                            else {
                                bail!(
                                    "koji root log error: unrecognized line shape: {line}"
                                );
                            };
                            if already_idx < 2 {
                                bail!(
                                    "koji root log error: unrecognized line shape: {line}"
                                );
                            }
                            let pkg_idx = already_idx - 2;
                            if let Some(token) = tokens.get(pkg_idx) {
                                required_pkgs.push(name_from_token(token));
                            }
                            let main_idx = if pkg_idx == 3 { 7 } else { 2 };
                            if let Some(token) = tokens.get(main_idx) {
                                required_pkgs.push((*token).to_string());
                            }
                        }
                        8 | 3 => {
                            required_pkgs.push(tokens[2].to_string());
                        }
                        7 | 4 => {
                            // Continuation of a wrapped long package name.
                        }
                        6 | 5 => {
                            // Either a normal line or the continuation of a
                            // size-wrapped long EVR; the size unit in column
                            // five tells them apart.
                            if SIZE_UNITS.contains(&tokens[4]) {
                                continue;
                            }
                            required_pkgs.push(tokens[2].to_string());
                        }
                        _ => {
                            bail!("koji root log error: unrecognized line shape: {line}");
                        }
                    }
                }
            }
        }
    }

    Ok(required_pkgs)
}
