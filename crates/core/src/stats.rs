use crate::error::IngestError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LengthStats {
    pub count: usize,
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub median: f64,
}

impl LengthStats {
    pub fn from_values(values: &[usize]) -> Result<Self, IngestError> {
        if values.is_empty() {
            return Err(IngestError::InvalidArgument(
                "cannot compute statistics of an empty chunk file".to_string(),
            ));
        }

        let mut sorted = values.to_vec();
        sorted.sort_unstable();

        let count = sorted.len();
        let mean = sorted.iter().sum::<usize>() as f64 / count as f64;
        let median = if count % 2 == 1 {
            sorted[count / 2] as f64
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) as f64 / 2.0
        };

        Ok(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            median,
        })
    }
}

impl fmt::Display for LengthStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Count: {}", self.count)?;
        writeln!(f, "  Min: {}", self.min)?;
        writeln!(f, "  Max: {}", self.max)?;
        writeln!(f, "  Mean: {:.2}", self.mean)?;
        write!(f, "  Median: {}", self.median)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkLengthReport {
    pub characters: LengthStats,
    pub words: LengthStats,
}

pub fn chunk_length_report<'a, I>(texts: I) -> Result<ChunkLengthReport, IngestError>
where
    I: IntoIterator<Item = &'a str>,
{
    let (chars, words): (Vec<usize>, Vec<usize>) = texts
        .into_iter()
        .map(|text| (text.chars().count(), text.split_whitespace().count()))
        .unzip();

    Ok(ChunkLengthReport {
        characters: LengthStats::from_values(&chars)?,
        words: LengthStats::from_values(&words)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_covers_characters_and_words() -> Result<(), IngestError> {
        let report = chunk_length_report(["one two", "three", "four five six"])?;

        assert_eq!(report.characters.count, 3);
        assert_eq!(report.characters.min, 5);
        assert_eq!(report.characters.max, 13);
        assert_eq!(report.characters.median, 7.0);
        assert_eq!(report.words.mean, 2.0);
        Ok(())
    }

    #[test]
    fn even_counts_average_the_middle_pair() -> Result<(), IngestError> {
        let stats = LengthStats::from_values(&[4, 1, 3, 2])?;
        assert_eq!(stats.median, 2.5);
        Ok(())
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(chunk_length_report(Vec::<&str>::new()).is_err());
    }
}
