//! Terminal implementation of [`PayerPrompt`] for `paragon ingest --interactive`.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use paragon_core::User;
use paragon_ingest::{IngestResult, PayerPrompt};

/// Asks on a line-oriented terminal.
pub struct TerminalPrompt<R, W> {
    io: Mutex<(R, W)>,
}

impl TerminalPrompt<io::BufReader<io::Stdin>, io::Stdout> {
    pub fn stdio() -> Self {
        TerminalPrompt::new(io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        TerminalPrompt {
            io: Mutex::new((input, output)),
        }
    }
}

/// Reads one trimmed line; `None` on end of input.
fn read_line<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

impl<R, W> PayerPrompt for TerminalPrompt<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn ask_payment_name(&self, source: &str) -> IngestResult<Option<String>> {
        let mut guard = self.io.lock().unwrap_or_else(|e| e.into_inner());
        let (input, output) = &mut *guard;

        write!(output, "Enter payment name for {} (or press Enter to skip): ", source)?;
        output.flush()?;
        Ok(read_line(input)?.filter(|name| !name.is_empty()))
    }

    fn choose_member(&self, payment_name: &str, members: &[User]) -> IngestResult<Option<i64>> {
        let mut guard = self.io.lock().unwrap_or_else(|e| e.into_inner());
        let (input, output) = &mut *guard;

        writeln!(output)?;
        writeln!(output, "Payment name not found: {}", payment_name)?;
        writeln!(output, "Assign to:")?;
        for (i, member) in members.iter().enumerate() {
            if member.is_other {
                writeln!(output, "{}. {} (not ours)", i + 1, member.name)?;
            } else {
                writeln!(output, "{}. {}", i + 1, member.name)?;
            }
        }
        writeln!(output, "0. Skip this receipt")?;

        loop {
            write!(output, "Enter your choice (0-{}): ", members.len())?;
            output.flush()?;

            let Some(answer) = read_line(input)? else {
                return Ok(None);
            };
            match answer.parse::<usize>() {
                Ok(0) => return Ok(None),
                Ok(n) if n <= members.len() => return Ok(Some(members[n - 1].user_id)),
                _ => writeln!(
                    output,
                    "Please enter a number between 0 and {}",
                    members.len()
                )?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn members() -> Vec<User> {
        vec![
            User {
                user_id: 1,
                name: "Ania".into(),
                is_other: false,
            },
            User {
                user_id: 2,
                name: "Tomek".into(),
                is_other: false,
            },
            User {
                user_id: 3,
                name: "Other".into(),
                is_other: true,
            },
        ]
    }

    #[test]
    fn test_choose_member_retries_until_valid() {
        let prompt = TerminalPrompt::new(Cursor::new("x\n9\n3\n"), Vec::new());

        let chosen = prompt.choose_member("Karta", &members()).unwrap();
        assert_eq!(chosen, Some(3));

        let (_, output) = prompt.io.into_inner().unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("3. Other (not ours)"));
        assert_eq!(output.matches("Please enter a number").count(), 2);
    }

    #[test]
    fn test_choose_member_skip_and_eof() {
        let prompt = TerminalPrompt::new(Cursor::new("0\n"), Vec::new());
        assert_eq!(prompt.choose_member("Karta", &members()).unwrap(), None);

        let prompt = TerminalPrompt::new(Cursor::new(""), Vec::new());
        assert_eq!(prompt.choose_member("Karta", &members()).unwrap(), None);
    }

    #[test]
    fn test_ask_payment_name() {
        let prompt = TerminalPrompt::new(Cursor::new("  Gotówka \n\n"), Vec::new());
        assert_eq!(
            prompt.ask_payment_name("a.json").unwrap(),
            Some("Gotówka".to_string())
        );
        assert_eq!(prompt.ask_payment_name("b.json").unwrap(), None);
    }
}
