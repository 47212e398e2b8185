//! The immutable universe of mailing lists, aliases, and tag symbols.
//!
//! The universe is built once at server startup and queried read-only for
//! every message afterward. There is no support for reloading it without
//! restarting the server.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use log::{debug, warn};
use thiserror::Error;

/// One entry of a mailing list definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    /// An address, optionally with a display name.
    Address { addr: String, name: Option<String> },
    /// A reference to another list by name.
    ListRef(String),
}

/// Errors constructing a [`Universe`]. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("list {list} references unknown list {reference}")]
    UnknownListRef { list: String, reference: String },

    #[error("mailing lists form a cycle: {}", .0.join(" -> "))]
    ListCycle(Vec<String>),

    #[error("malformed symbols line {line}: {text:?}")]
    BadSymbolsLine { line: usize, text: String },
}

/// Failure to resolve one identifier against the universe.
///
/// The rendered forms are suitable for an SMTP reply and the resulting
/// bounce, and keep the identifier exactly as the sender wrote it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no such list or person: {0}")]
    UnknownName(String),

    #[error("ambiguous name {name}: matches {}", .candidates.join(", "))]
    AmbiguousName {
        name: String,
        candidates: Vec<String>,
    },
}

/// Immutable snapshot of the configured lists and the name index over them.
#[derive(Debug)]
pub struct Universe {
    /// Member sequences as configured, keyed by lowercased list name.
    lists: HashMap<String, Vec<Member>>,
    /// Transitive flattened membership per list, computed at build time.
    expansions: HashMap<String, BTreeSet<String>>,
    /// Alias to candidate canonical addresses. More than one candidate
    /// marks the alias ambiguous.
    aliases: HashMap<String, BTreeSet<String>>,
    /// Lowercased list name to subject-tag symbol.
    symbols: HashMap<String, String>,
}

impl Universe {
    /// Builds a universe from (list name, member lines) pairs and a symbols
    /// table.
    ///
    /// Member lines are classified syntactically: a line containing `<` is a
    /// display entry, a line containing `@` is a bare address, anything else
    /// references another list. Blank lines and `#` comments are skipped.
    pub fn build<I>(defs: I, symbols: HashMap<String, String>) -> Result<Universe, UniverseError>
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut lists = HashMap::new();
        for (name, lines) in defs {
            let members = lines.iter().filter_map(|line| parse_member(line)).collect();
            lists.insert(name.to_lowercase(), members);
        }

        check_references(&lists)?;
        check_cycles(&lists)?;

        let mut expansions = HashMap::new();
        for name in lists.keys() {
            flatten(name, &lists, &mut expansions);
        }

        let aliases = build_aliases(&lists);
        let symbols = symbols
            .into_iter()
            .map(|(name, symbol)| (name.to_lowercase(), symbol))
            .collect();

        Ok(Universe {
            lists,
            expansions,
            aliases,
            symbols,
        })
    }

    /// Loads a universe from the on-disk layout: one file per list in
    /// `lists_dir` (filename = list name), and a symbols file with one
    /// `name:Symbol` line per list.
    pub fn load(lists_dir: &Path, symbols_file: &Path) -> Result<Universe, UniverseError> {
        let mut defs = Vec::new();
        for entry in fs::read_dir(lists_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_list_name(&name) {
                warn!("skipping {name:?} in {}: not a list name", lists_dir.display());
                continue;
            }
            let lines = fs::read_to_string(entry.path())?
                .lines()
                .map(str::to_owned)
                .collect();
            debug!("loaded list {name}");
            defs.push((name, lines));
        }

        let symbols = load_symbols(symbols_file)?;
        Universe::build(defs, symbols)
    }

    /// Resolves an identifier to its set of canonical addresses.
    ///
    /// The identifier may be a list name or an individual identifier: the
    /// username, a single name token, or the period-joined full name of a
    /// member, as long as it identifies exactly one individual. A name that
    /// is both a list and an alias resolves as the list, so every list stays
    /// addressable.
    pub fn resolve(&self, ident: &str) -> Result<BTreeSet<String>, ResolveError> {
        let key = ident.to_lowercase();
        if let Some(expansion) = self.expansions.get(&key) {
            return Ok(expansion.clone());
        }
        match self.aliases.get(&key) {
            Some(candidates) if candidates.len() == 1 => Ok(candidates.clone()),
            Some(candidates) => Err(ResolveError::AmbiguousName {
                name: ident.to_string(),
                candidates: candidates.iter().cloned().collect(),
            }),
            None => Err(ResolveError::UnknownName(ident.to_string())),
        }
    }

    /// The subject-tag symbol configured for a list, if any.
    pub fn symbol(&self, name: &str) -> Option<&str> {
        self.symbols.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Whether the name denotes a configured list.
    pub fn is_list(&self, name: &str) -> bool {
        self.lists.contains_key(&name.to_lowercase())
    }

    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

/// Accepts the identifier character set used for list filenames.
fn is_list_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

/// Classifies one member line. Returns None for blanks and `#` comments.
fn parse_member(line: &str) -> Option<Member> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    if let Some((name_part, addr_part)) = line.split_once('<') {
        let name = name_part.trim().trim_matches('"').replace('\\', "");
        let name = name.trim().to_string();
        Some(Member::Address {
            addr: addr_part.trim().trim_end_matches('>').to_lowercase(),
            name: (!name.is_empty()).then_some(name),
        })
    } else if line.contains('@') {
        Some(Member::Address {
            addr: line.to_lowercase(),
            name: None,
        })
    } else {
        Some(Member::ListRef(line.to_lowercase()))
    }
}

fn load_symbols(path: &Path) -> Result<HashMap<String, String>, UniverseError> {
    let mut symbols = HashMap::new();
    for (index, line) in fs::read_to_string(path)?.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, symbol) =
            line.split_once(':')
                .ok_or_else(|| UniverseError::BadSymbolsLine {
                    line: index + 1,
                    text: line.to_string(),
                })?;
        symbols.insert(name.trim().to_lowercase(), symbol.trim().to_string());
    }
    Ok(symbols)
}

/// Every list reference must name a configured list.
fn check_references(lists: &HashMap<String, Vec<Member>>) -> Result<(), UniverseError> {
    for (name, members) in lists {
        for member in members {
            if let Member::ListRef(reference) = member {
                if !lists.contains_key(reference) {
                    return Err(UniverseError::UnknownListRef {
                        list: name.clone(),
                        reference: reference.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Rejects cyclic list references with a DFS over the reference graph.
fn check_cycles(lists: &HashMap<String, Vec<Member>>) -> Result<(), UniverseError> {
    let mut colors: HashMap<&str, Color> = lists.keys().map(|k| (k.as_str(), Color::White)).collect();
    let mut stack = Vec::new();
    for name in lists.keys() {
        if colors[name.as_str()] == Color::White {
            visit(name, lists, &mut colors, &mut stack)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    name: &'a str,
    lists: &'a HashMap<String, Vec<Member>>,
    colors: &mut HashMap<&'a str, Color>,
    stack: &mut Vec<&'a str>,
) -> Result<(), UniverseError> {
    colors.insert(name, Color::Gray);
    stack.push(name);
    for member in &lists[name] {
        if let Member::ListRef(reference) = member {
            match colors[reference.as_str()] {
                Color::Gray => {
                    // Back edge: report the lists along the cycle.
                    let start = stack
                        .iter()
                        .position(|n| *n == reference.as_str())
                        .unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(reference.clone());
                    return Err(UniverseError::ListCycle(cycle));
                }
                Color::White => visit(reference, lists, colors, stack)?,
                Color::Black => {}
            }
        }
    }
    stack.pop();
    colors.insert(name, Color::Black);
    Ok(())
}

/// Flattens a list to its transitive set of canonical addresses. Cycles
/// were ruled out before this runs.
fn flatten(
    name: &str,
    lists: &HashMap<String, Vec<Member>>,
    expansions: &mut HashMap<String, BTreeSet<String>>,
) -> BTreeSet<String> {
    if let Some(expansion) = expansions.get(name) {
        return expansion.clone();
    }
    let mut set = BTreeSet::new();
    for member in &lists[name] {
        match member {
            Member::Address { addr, .. } => {
                set.insert(addr.clone());
            }
            Member::ListRef(reference) => {
                set.extend(flatten(reference, lists, expansions));
            }
        }
    }
    expansions.insert(name.to_string(), set.clone());
    set
}

/// Builds the alias index over every address entry.
///
/// The username (local part) of every address is an alias. When a display
/// name is present, each lowercased name token and the period-joined full
/// name are aliases as well, stripped of characters outside `[a-z0-9.]`.
/// An alias pointing at two distinct addresses stays in the index with all
/// its candidates, which marks it ambiguous.
fn build_aliases(lists: &HashMap<String, Vec<Member>>) -> HashMap<String, BTreeSet<String>> {
    let mut aliases: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut add = |key: String, addr: &str| {
        if !key.is_empty() {
            aliases.entry(key).or_default().insert(addr.to_string());
        }
    };

    for members in lists.values() {
        for member in members {
            let Member::Address { addr, name } = member else {
                continue;
            };
            let username = addr.split('@').next().unwrap_or_default();
            add(username.to_string(), addr);
            if let Some(name) = name {
                let tokens: Vec<String> = name.to_lowercase().split_whitespace().map(clean_token).collect();
                for token in &tokens {
                    add(token.clone(), addr);
                }
                add(clean_token(&tokens.join(".")), addr);
            }
        }
    }

    aliases
}

fn clean_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.')
        .collect()
}
