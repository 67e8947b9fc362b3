use anyhow::{bail, Result};

/// Inclusive numeric range of item ids sharing a prefix, e.g. `afc2019048_0001..=afc2019048_0100`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRange {
    prefix: String,
    width: usize,
    start: u32,
    end: u32,
}

impl IdRange {
    pub fn new(prefix: &str, width: usize, start: u32, end: u32) -> Result<Self> {
        if start > end {
            bail!("Invalid id range: start {} is after end {}", start, end);
        }
        Ok(Self {
            prefix: prefix.to_string(),
            width,
            start,
            end,
        })
    }

    pub fn format(&self, number: u32) -> String {
        format!("{}{:0width$}", self.prefix, number, width = self.width)
    }

    pub fn first(&self) -> String {
        self.format(self.start)
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn ids(&self) -> impl Iterator<Item = String> + '_ {
        (self.start..=self.end).map(move |n| self.format(n))
    }

    /// Same range restarted at `number`, for resuming an interrupted run.
    pub fn resume_from(&self, number: u32) -> Result<Self> {
        if number < self.start || number > self.end {
            bail!(
                "Resume point {} is outside {}..={}",
                number,
                self.start,
                self.end
            );
        }
        Self::new(&self.prefix, self.width, number, self.end)
    }
}
