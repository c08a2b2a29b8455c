//! Push identifiers
//!
//! Each run gets a pronounceable id: it names the log file, seeds an
//! unseeded shuffle, and gives operators something to say out loud when a
//! push needs discussing.

use std::path::Path;

use rand::Rng;
use tracing::debug;

/// Pick a push id from the wordlist, falling back to hex when the wordlist
/// is unusable
#[must_use]
pub fn generate(wordlist: &Path) -> String {
    match pick_word(wordlist) {
        Some(word) => word,
        None => {
            debug!(wordlist = %wordlist.display(), "wordlist unusable, using hex id");
            format!("push-{:08x}", rand::rng().random::<u32>())
        }
    }
}

fn pick_word(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let words: Vec<&str> = content
        .lines()
        .filter(|word| word.len() >= 5 && word.chars().all(|c| c.is_ascii_lowercase()))
        .collect();

    if words.is_empty() {
        return None;
    }

    let index = rand::rng().random_range(0..words.len());
    Some(words[index].to_string())
}
