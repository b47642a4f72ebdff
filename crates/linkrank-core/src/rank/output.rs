//! Human-facing ranking table and binary score dumps.
//!
//! The table is `title<TAB>score` per line, no header, sorted by descending
//! score (ties by ascending id), scores in 4-digit scientific notation with a
//! signed two-digit exponent (`3.3333e-01`). The raw dump is `N` little-endian
//! `f64` values in id order; the `.npy` dump wraps the same bytes in a NumPy
//! v1.0 header.

use std::io::{Read, Write};

use crate::errors::{LinkRankError, LinkRankResult};
use crate::indexer::titles::TitleIndex;
use crate::models::{RankedTitle, TitleId};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;

/// `%.4e`-style formatting: `1.2346e+03`, `5.0000e-08`, `0.0000e+00`.
pub fn format_score(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string().to_lowercase();
    }
    let formatted = format!("{value:.4e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exp: i32 = exponent.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => formatted,
    }
}

/// Ids ordered by descending score, ties by ascending id.
pub fn ranked_order(scores: &[f64]) -> Vec<TitleId> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    order.into_iter().map(|i| i as TitleId).collect()
}

pub fn ranked_titles(index: &TitleIndex, scores: &[f64]) -> Vec<RankedTitle> {
    ranked_order(scores)
        .into_iter()
        .map(|id| RankedTitle {
            title: index.title_of(id).to_string(),
            score: scores[id as usize],
        })
        .collect()
}

/// Scores for a subset of titles, best first. Titles missing from the index are skipped.
pub fn rank_titles<S: AsRef<str>>(
    index: &TitleIndex,
    scores: &[f64],
    titles: &[S],
) -> Vec<RankedTitle> {
    let mut ranked: Vec<(TitleId, f64)> = titles
        .iter()
        .filter_map(|t| index.get(t.as_ref()))
        .filter_map(|id| scores.get(id as usize).map(|&s| (id, s)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.dedup_by_key(|entry| entry.0);
    ranked
        .into_iter()
        .map(|(id, score)| RankedTitle {
            title: index.title_of(id).to_string(),
            score,
        })
        .collect()
}

pub fn score_of(index: &TitleIndex, scores: &[f64], title: &str) -> Option<f64> {
    index
        .get(title)
        .and_then(|id| scores.get(id as usize).copied())
}

/// Write the ranking table; returns the number of rows written.
pub fn write_ranking_tsv<W: Write>(
    writer: &mut W,
    index: &TitleIndex,
    scores: &[f64],
) -> LinkRankResult<usize> {
    if index.len() != scores.len() {
        return Err(LinkRankError::ShapeMismatch {
            expected: index.len(),
            found: scores.len(),
        });
    }
    let order = ranked_order(scores);
    for &id in &order {
        writeln!(
            writer,
            "{}\t{}",
            index.title_of(id),
            format_score(scores[id as usize])
        )?;
    }
    writer.flush()?;
    Ok(order.len())
}

pub fn write_scores_raw<W: Write>(writer: &mut W, scores: &[f64]) -> LinkRankResult<()> {
    for score in scores {
        writer.write_all(&score.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_scores_raw<R: Read>(reader: &mut R) -> LinkRankResult<Vec<f64>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    decode_f64s(&bytes)
}

fn decode_f64s(bytes: &[u8]) -> LinkRankResult<Vec<f64>> {
    if bytes.len() % 8 != 0 {
        return Err(LinkRankError::Corrupt(format!(
            "score dump of {} bytes is not a whole number of f64 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(c);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// NumPy `.npy` v1.0, dtype `<f8`, shape `(N,)`.
pub fn write_scores_npy<W: Write>(writer: &mut W, scores: &[f64]) -> LinkRankResult<()> {
    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({},), }}",
        scores.len()
    );
    // magic(6) + version(2) + header length(2) + header + '\n' aligned to 64.
    let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    writer.write_all(NPY_MAGIC)?;
    writer.write_all(&[1u8, 0u8])?;
    writer.write_all(&(header.len() as u16).to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    write_scores_raw(writer, scores)
}

/// Read back a `.npy` file written by [`write_scores_npy`].
pub fn read_scores_npy<R: Read>(reader: &mut R) -> LinkRankResult<Vec<f64>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(LinkRankError::Corrupt("missing .npy magic".to_string()));
    }
    if bytes[6] != 1 {
        return Err(LinkRankError::Corrupt(format!(
            "unsupported .npy version {}.{}",
            bytes[6], bytes[7]
        )));
    }
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let data_start = 10 + header_len;
    if bytes.len() < data_start {
        return Err(LinkRankError::Corrupt("truncated .npy header".to_string()));
    }
    let header = String::from_utf8_lossy(&bytes[10..data_start]);
    if !header.contains("'descr': '<f8'") || !header.contains("'fortran_order': False") {
        return Err(LinkRankError::Corrupt(format!(
            "unsupported .npy header {}",
            header.trim()
        )));
    }
    decode_f64s(&bytes[data_start..])
}
