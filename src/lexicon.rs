//! WordNet database reader.
//!
//! Reads the plain-text `dict/` distribution of WordNet 3.x: the `index.*`
//! files map lemmas to synset offsets, the `data.*` files list the lemmas of
//! each synset, and the `*.exc` files hold irregular inflections.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::LexiconConfig;
use crate::error::{EvalError, Result};
use crate::utils::normalize_token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pos {
    Noun,
    Verb,
    Adj,
    Adv,
}

impl Pos {
    pub const ALL: [Pos; 4] = [Pos::Noun, Pos::Verb, Pos::Adj, Pos::Adv];

    fn file_suffix(&self) -> &'static str {
        match self {
            Pos::Noun => "noun",
            Pos::Verb => "verb",
            Pos::Adj => "adj",
            Pos::Adv => "adv",
        }
    }

    /// Regular inflection rules, tried in order: (suffix, replacement).
    fn detachment_rules(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Pos::Noun => &[
                ("s", ""),
                ("ses", "s"),
                ("xes", "x"),
                ("zes", "z"),
                ("ches", "ch"),
                ("shes", "sh"),
                ("men", "man"),
                ("ies", "y"),
            ],
            Pos::Verb => &[
                ("s", ""),
                ("ies", "y"),
                ("es", "e"),
                ("es", ""),
                ("ed", "e"),
                ("ed", ""),
                ("ing", "e"),
                ("ing", ""),
            ],
            Pos::Adj => &[("er", ""), ("est", ""), ("er", "e"), ("est", "e")],
            Pos::Adv => &[],
        }
    }
}

pub type SynsetId = (Pos, u64);

pub fn required_files() -> Vec<String> {
    Pos::ALL
        .iter()
        .flat_map(|pos| {
            let suffix = pos.file_suffix();
            [
                format!("index.{}", suffix),
                format!("data.{}", suffix),
                format!("{}.exc", suffix),
            ]
        })
        .collect()
}

pub fn missing_files(dir: &Path) -> Vec<String> {
    required_files()
        .into_iter()
        .filter(|f| !dir.join(f).is_file())
        .collect()
}

/// Make sure the WordNet files are present in `config.data_dir`, fetching any
/// missing file from `config.download_url` when allowed. A no-op when nothing
/// is missing.
pub fn ensure_available(config: &LexiconConfig) -> Result<()> {
    let missing = missing_files(&config.data_dir);
    if missing.is_empty() {
        debug!(dir = %config.data_dir.display(), "WordNet files present");
        return Ok(());
    }

    let url = match (&config.download_url, config.auto_download) {
        (Some(url), true) => url.trim_end_matches('/').to_string(),
        _ => {
            return Err(EvalError::LexiconUnavailable(format!(
                "{} is missing {} and no download source is enabled",
                config.data_dir.display(),
                missing.join(", ")
            )))
        }
    };

    fs::create_dir_all(&config.data_dir).map_err(|e| EvalError::io(&config.data_dir, e))?;
    info!(
        dir = %config.data_dir.display(),
        source = %url,
        files = missing.len(),
        "Downloading WordNet files"
    );

    // reqwest::blocking must not run on an async worker thread.
    let dir = config.data_dir.clone();
    let handle = std::thread::spawn(move || {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| EvalError::Download(e.to_string()))?;
        download_files(&client, &url, &dir, &missing)
    });
    handle
        .join()
        .map_err(|_| EvalError::Download("download thread panicked".into()))?
}

/// Fetch `files` into `dir`. A source ending in `.zip` is downloaded once and
/// unpacked; any other source is a base URL serving each file individually.
fn download_files(
    client: &reqwest::blocking::Client,
    source: &str,
    dir: &Path,
    files: &[String],
) -> Result<()> {
    if source.ends_with(".zip") {
        let archive = fetch(client, source)?;
        return unpack_archive(&archive, dir, files);
    }
    for file in files {
        let body = fetch(client, &format!("{}/{}", source, file))?;
        write_file(dir, file, &body)?;
    }
    Ok(())
}

fn fetch(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>> {
    let body = client
        .get(url)
        .send()
        .and_then(|resp| resp.error_for_status())
        .and_then(|resp| resp.bytes())
        .map_err(|e| EvalError::Download(format!("{}: {}", url, e)))?;
    debug!(url = %url, bytes = body.len(), "Fetched");
    Ok(body.to_vec())
}

/// Write through a `.part` file so a failed transfer never looks complete.
fn write_file(dir: &Path, file: &str, body: &[u8]) -> Result<()> {
    let partial = dir.join(format!("{}.part", file));
    let target = dir.join(file);
    fs::write(&partial, body).map_err(|e| EvalError::io(&partial, e))?;
    fs::rename(&partial, &target).map_err(|e| EvalError::io(&target, e))
}

/// Extract the wanted dict files from a zip archive, whatever directory they
/// sit under inside it. Every wanted file must be found.
fn unpack_archive(bytes: &[u8], dir: &Path, wanted: &[String]) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| EvalError::Download(format!("not a zip archive: {}", e)))?;
    let mut remaining: HashSet<&str> = wanted.iter().map(String::as_str).collect();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| EvalError::Download(format!("corrupt zip entry {}: {}", i, e)))?;
        if entry.is_dir() {
            continue;
        }
        let name = match Path::new(entry.name()).file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if !remaining.remove(name.as_str()) {
            continue;
        }
        let mut body = Vec::new();
        entry
            .read_to_end(&mut body)
            .map_err(|e| EvalError::io(dir.join(&name), e))?;
        write_file(dir, &name, &body)?;
    }

    if !remaining.is_empty() {
        let mut absent: Vec<&str> = remaining.into_iter().collect();
        absent.sort_unstable();
        return Err(EvalError::Download(format!(
            "archive is missing {}",
            absent.join(", ")
        )));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct Lexicon {
    index: HashMap<Pos, HashMap<String, Vec<u64>>>,
    synsets: HashMap<SynsetId, Vec<String>>,
    exceptions: HashMap<Pos, HashMap<String, Vec<String>>>,
}

impl Lexicon {
    pub fn load(dir: &Path) -> Result<Self> {
        let mut lexicon = Lexicon::default();
        for pos in Pos::ALL {
            let suffix = pos.file_suffix();

            let index_path = dir.join(format!("index.{}", suffix));
            let text = fs::read_to_string(&index_path).map_err(|e| EvalError::io(&index_path, e))?;
            lexicon.index.insert(pos, parse_index(&text));

            let data_path = dir.join(format!("data.{}", suffix));
            let text = fs::read_to_string(&data_path).map_err(|e| EvalError::io(&data_path, e))?;
            for (offset, lemmas) in parse_data(&text) {
                lexicon.synsets.insert((pos, offset), lemmas);
            }

            let exc_path = dir.join(format!("{}.exc", suffix));
            let exceptions = match fs::read_to_string(&exc_path) {
                Ok(text) => parse_exceptions(&text),
                Err(e) => {
                    debug!(path = %exc_path.display(), error = %e, "No exception list");
                    HashMap::new()
                }
            };
            lexicon.exceptions.insert(pos, exceptions);
        }

        info!(
            dir = %dir.display(),
            lemmas = lexicon.index.values().map(HashMap::len).sum::<usize>(),
            synsets = lexicon.synsets.len(),
            "Loaded WordNet"
        );
        Ok(lexicon)
    }

    pub fn is_empty(&self) -> bool {
        self.synsets.is_empty()
    }

    fn in_index(&self, lemma: &str, pos: Pos) -> bool {
        self.index
            .get(&pos)
            .is_some_and(|entries| entries.contains_key(lemma))
    }

    /// Base forms of `word` that exist in the index for `pos`.
    pub fn base_forms(&self, word: &str, pos: Pos) -> Vec<String> {
        let form = normalize_token(word);
        if form.is_empty() {
            return vec![];
        }

        let keep = |candidates: Vec<String>| -> Vec<String> {
            let mut seen = HashSet::new();
            candidates
                .into_iter()
                .filter(|c| self.in_index(c, pos) && seen.insert(c.clone()))
                .collect()
        };

        if let Some(irregular) = self.exceptions.get(&pos).and_then(|m| m.get(&form)) {
            let mut candidates = vec![form.clone()];
            candidates.extend(irregular.iter().cloned());
            return keep(candidates);
        }

        let rules = pos.detachment_rules();
        let apply = |forms: &[String]| -> Vec<String> {
            forms
                .iter()
                .flat_map(|f| {
                    rules.iter().filter_map(move |(old, new)| {
                        f.strip_suffix(old).map(|stem| format!("{}{}", stem, new))
                    })
                })
                .collect()
        };

        let mut forms = apply(std::slice::from_ref(&form));
        let mut candidates = vec![form.clone()];
        candidates.extend(forms.iter().cloned());
        let found = keep(candidates);
        if !found.is_empty() {
            return found;
        }

        // Every rule shortens or rewrites a suffix, so this settles quickly;
        // the bound only guards against pathological input.
        for _ in 0..form.len() {
            if forms.is_empty() {
                break;
            }
            forms = apply(&forms);
            let found = keep(forms.clone());
            if !found.is_empty() {
                return found;
            }
        }
        vec![]
    }

    /// All synsets of every base form of `word`, across parts of speech.
    pub fn senses(&self, word: &str) -> Vec<SynsetId> {
        let mut seen = HashSet::new();
        let mut senses = vec![];
        for pos in Pos::ALL {
            for lemma in self.base_forms(word, pos) {
                let offsets = self
                    .index
                    .get(&pos)
                    .and_then(|entries| entries.get(&lemma));
                for &offset in offsets.into_iter().flatten() {
                    if seen.insert((pos, offset)) {
                        senses.push((pos, offset));
                    }
                }
            }
        }
        senses
    }

    /// Lemma names of every sense of `word`. Empty for unknown words.
    pub fn sense_terms(&self, word: &str) -> HashSet<String> {
        self.senses(word)
            .iter()
            .filter_map(|id| self.synsets.get(id))
            .flatten()
            .cloned()
            .collect()
    }
}

fn parse_index(text: &str) -> HashMap<String, Vec<u64>> {
    let mut entries = HashMap::new();
    for line in text.lines() {
        if line.starts_with(' ') || line.trim().is_empty() {
            continue;
        }
        match parse_index_line(line) {
            Some((lemma, offsets)) => {
                entries.insert(lemma, offsets);
            }
            None => debug!(line, "Skipping malformed index line"),
        }
    }
    entries
}

// lemma pos synset_cnt p_cnt [ptr_symbol...] sense_cnt tagsense_cnt synset_offset...
fn parse_index_line(line: &str) -> Option<(String, Vec<u64>)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let synset_cnt: usize = fields.get(2)?.parse().ok()?;
    let p_cnt: usize = fields.get(3)?.parse().ok()?;
    if fields.len() != 4 + p_cnt + 2 + synset_cnt {
        return None;
    }
    let offsets = fields[fields.len() - synset_cnt..]
        .iter()
        .map(|f| f.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    Some((fields[0].to_lowercase(), offsets))
}

fn parse_data(text: &str) -> Vec<(u64, Vec<String>)> {
    let mut synsets = vec![];
    for line in text.lines() {
        if line.starts_with(' ') || line.trim().is_empty() {
            continue;
        }
        match parse_data_line(line) {
            Some(entry) => synsets.push(entry),
            None => debug!(line, "Skipping malformed data line"),
        }
    }
    synsets
}

// synset_offset lex_filenum ss_type w_cnt word lex_id [word lex_id...] p_cnt ... | gloss
fn parse_data_line(line: &str) -> Option<(u64, Vec<String>)> {
    let head = line.split('|').next()?;
    let fields: Vec<&str> = head.split_whitespace().collect();
    let offset: u64 = fields.first()?.parse().ok()?;
    let w_cnt = usize::from_str_radix(fields.get(3)?, 16).ok()?;
    if fields.len() < 4 + 2 * w_cnt {
        return None;
    }
    let lemmas = (0..w_cnt)
        .map(|i| strip_adjective_marker(fields[4 + 2 * i]).to_lowercase())
        .collect();
    Some((offset, lemmas))
}

/// `great(a)` / `galore(ip)` -> `great` / `galore`
fn strip_adjective_marker(word: &str) -> &str {
    match word.find('(') {
        Some(idx) if word.ends_with(')') => &word[..idx],
        _ => word,
    }
}

fn parse_exceptions(text: &str) -> HashMap<String, Vec<String>> {
    let mut exceptions = HashMap::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        if let Some(inflected) = fields.next() {
            let bases: Vec<String> = fields.map(|f| f.to_lowercase()).collect();
            if bases.is_empty() {
                warn!(line, "Exception entry without base form");
                continue;
            }
            exceptions.insert(inflected.to_lowercase(), bases);
        }
    }
    exceptions
}
