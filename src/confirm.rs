//! Confirmation of each sample before its payloads are pushed.

use std::io;
use std::io::BufRead;
use std::io::Write;

use crate::discovery::Candidate;

/// Whether a candidate's payloads should be pushed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Push the candidate.
    Send,

    /// Leave the candidate out.
    Skip,
}

/// Decides, one candidate at a time, which candidates are pushed.
///
/// Besides the provided policies, any closure taking a candidate and returning
/// an [`io::Result<Decision>`] is a policy.
///
/// # Examples
///
/// ```
/// use qcpush::confirm::Decision;
/// use qcpush::confirm::Policy;
/// use qcpush::discovery::Candidate;
///
/// let mut passed_only = |candidate: &Candidate| -> std::io::Result<Decision> {
///     Ok(if candidate.check == "passed" { Decision::Send } else { Decision::Skip })
/// };
///
/// let candidate = Candidate::from_path("/r", "/r/failed/wgs_east/NBA2/RUN/S1/qc.json").unwrap();
/// assert_eq!(passed_only.decide(&candidate)?, Decision::Skip);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub trait Policy {
    /// Decides whether `candidate` is pushed.
    fn decide(&mut self, candidate: &Candidate) -> io::Result<Decision>;
}

impl<F> Policy for F
where
    F: FnMut(&Candidate) -> io::Result<Decision>,
{
    fn decide(&mut self, candidate: &Candidate) -> io::Result<Decision> {
        self(candidate)
    }
}

/// Pushes every candidate.
#[derive(Clone, Copy, Debug, Default)]
pub struct All;

impl Policy for All {
    fn decide(&mut self, _: &Candidate) -> io::Result<Decision> {
        Ok(Decision::Send)
    }
}

/// The stage an interactive prompt is in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    /// Nothing has been asked yet.
    Undecided,

    /// Every remaining candidate is sent.
    All,

    /// Every candidate is confirmed individually.
    OneByOne,
}

/// Asks the operator.
///
/// Before the first candidate, the operator chooses between sending all
/// candidates (`a`) and confirming them one by one (any other answer, usually
/// `o`). When confirming one by one, each candidate is sent (`y`), skipped
/// (`n`) or sent along with every remaining candidate (`a`). Any other answer
/// asks again.
///
/// # Examples
///
/// ```
/// use qcpush::confirm::Decision;
/// use qcpush::confirm::Policy;
/// use qcpush::confirm::Prompt;
/// use qcpush::discovery::Candidate;
///
/// let candidate = Candidate::from_path("/r", "/r/passed/wgs_east/NBA2/RUN/S1/qc.json").unwrap();
///
/// let mut prompt = Prompt::new(&b"o\nn\nmaybe\ny\n"[..], Vec::new());
/// assert_eq!(prompt.decide(&candidate)?, Decision::Skip);
/// assert_eq!(prompt.decide(&candidate)?, Decision::Send);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Prompt<R, W> {
    /// Where answers are read from.
    reader: R,

    /// Where questions are written to.
    writer: W,

    /// The current stage.
    mode: Mode,
}

impl<R, W> Prompt<R, W>
where
    R: BufRead,
    W: Write,
{
    /// Creates a new [`Prompt`].
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            mode: Mode::Undecided,
        }
    }

    /// Consumes self and returns the inner reader and writer.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Writes `question` and reads one trimmed line of answer.
    fn ask(&mut self, question: &str) -> io::Result<String> {
        writeln!(self.writer, "\n{question}")?;
        self.writer.flush()?;

        let mut answer = String::new();
        if self.reader.read_line(&mut answer)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no answer was given",
            ));
        }

        Ok(answer.trim().to_string())
    }
}

impl<R, W> Policy for Prompt<R, W>
where
    R: BufRead,
    W: Write,
{
    fn decide(&mut self, candidate: &Candidate) -> io::Result<Decision> {
        if self.mode == Mode::Undecided {
            let answer =
                self.ask("Enter 'a' to send all samples in the list or 'o' to confirm one by one...")?;
            self.mode = if answer == "a" {
                Mode::All
            } else {
                Mode::OneByOne
            };
        }

        loop {
            if self.mode == Mode::All {
                return Ok(Decision::Send);
            }

            let answer = self.ask(&format!(
                "Send {}? Enter 'y' to send, 'n' to skip or 'a' to send all remaining samples...",
                candidate.samplename
            ))?;

            match answer.as_str() {
                "y" => return Ok(Decision::Send),
                "n" => return Ok(Decision::Skip),
                "a" => self.mode = Mode::All,
                _ => writeln!(self.writer, "\nWrong choice... try again")?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Candidate> {
        ["S1", "S2", "S3", "S4"]
            .into_iter()
            .map(|name| {
                Candidate::from_path("/r", format!("/r/passed/wgs_east/NBA2/RUN/{name}/qc.json"))
                    .unwrap()
            })
            .collect()
    }

    fn run(policy: &mut impl Policy) -> io::Result<Vec<Decision>> {
        candidates()
            .iter()
            .map(|candidate| policy.decide(candidate))
            .collect()
    }

    #[test]
    fn it_sends_everything_after_an_upfront_all() -> io::Result<()> {
        let mut prompt = Prompt::new(&b"a\n"[..], Vec::new());
        assert_eq!(run(&mut prompt)?, [Decision::Send; 4]);

        let (_, transcript) = prompt.into_inner();
        assert_eq!(transcript.iter().filter(|&&b| b == b'?').count(), 0);

        Ok(())
    }

    #[test]
    fn it_confirms_one_by_one_until_all() -> io::Result<()> {
        let mut prompt = Prompt::new(&b"o\ny\nn\nwhat\na\n"[..], Vec::new());
        assert_eq!(
            run(&mut prompt)?,
            [
                Decision::Send,
                Decision::Skip,
                Decision::Send,
                Decision::Send
            ]
        );

        let (_, transcript) = prompt.into_inner();
        let transcript = String::from_utf8(transcript).unwrap();
        assert!(transcript.contains("Send S1?"));
        assert!(transcript.contains("Send S2?"));
        assert_eq!(transcript.matches("Send S3?").count(), 2);
        assert!(transcript.contains("Wrong choice... try again"));
        assert!(!transcript.contains("Send S4?"));

        Ok(())
    }

    #[test]
    fn it_fails_when_input_runs_out() {
        let mut prompt = Prompt::new(&b"o\ny\n"[..], Vec::new());
        let err = run(&mut prompt).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn it_accepts_closures_and_all() -> io::Result<()> {
        assert_eq!(run(&mut All)?, [Decision::Send; 4]);

        let mut every_other = {
            let mut n = 0;
            move |_: &Candidate| -> io::Result<Decision> {
                n += 1;
                Ok(if n % 2 == 0 { Decision::Skip } else { Decision::Send })
            }
        };

        assert_eq!(
            run(&mut every_other)?,
            [
                Decision::Send,
                Decision::Skip,
                Decision::Send,
                Decision::Skip
            ]
        );

        Ok(())
    }
}
