//! Result assembly and the msgpack transport encoding.

use crate::supervisor::Supervised;
use crate::types::{Accounting, CompletedCommand, ExitOutcome, Result, RunnerError};
use serde::Serialize;
use std::io::Write;

/// Pure assembly: no side effects beyond producing the record.
pub fn assemble(supervised: Supervised, accounting: Accounting) -> CompletedCommand {
    let (return_code, timed_out) = match supervised.outcome {
        ExitOutcome::Completed { return_code } => (return_code, false),
        // Whatever code the killed process reported carries no meaning, so
        // the record fixes it to 0.
        ExitOutcome::TimedOut => (0, true),
    };

    CompletedCommand {
        return_code,
        stdout: supervised.stdout,
        stderr: supervised.stderr,
        timed_out,
        time: accounting.cpu_time_ns,
        memory: accounting.memory_peak_bytes,
    }
}

/// Encodes the record as a field-tagged msgpack map: `return_code`, `stdout`,
/// `stderr`, `timed_out`, `time`, `memory`.
pub fn encode(result: &CompletedCommand) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    result
        .serialize(&mut rmp_serde::Serializer::new(&mut buf).with_struct_map())
        .map_err(|e| RunnerError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Writes the encoded record to `out` — the single contractual output of a
/// run; everything else is advisory diagnostics.
pub fn emit<W: Write>(result: &CompletedCommand, out: &mut W) -> Result<()> {
    out.write_all(&encode(result)?)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervised(outcome: ExitOutcome) -> Supervised {
        Supervised {
            outcome,
            stdout: b"out".to_vec(),
            stderr: b"err".to_vec(),
        }
    }

    #[test]
    fn completed_run_keeps_code_and_accounting() {
        let result = assemble(
            supervised(ExitOutcome::Completed { return_code: 3 }),
            Accounting {
                cpu_time_ns: 42,
                memory_peak_bytes: 4096,
            },
        );
        assert_eq!(result.return_code, 3);
        assert!(!result.timed_out);
        assert_eq!(result.stdout, b"out");
        assert_eq!(result.stderr, b"err");
        assert_eq!(result.time, 42);
        assert_eq!(result.memory, 4096);
    }

    #[test]
    fn timed_out_run_zeroes_the_return_code() {
        let result = assemble(
            supervised(ExitOutcome::TimedOut),
            Accounting::default(),
        );
        assert!(result.timed_out);
        assert_eq!(result.return_code, 0);
    }

    #[test]
    fn encoding_is_a_six_field_map() {
        let result = assemble(
            supervised(ExitOutcome::Completed { return_code: 0 }),
            Accounting::default(),
        );
        let buf = encode(&result).expect("encode");
        // fixmap with 6 entries
        assert_eq!(buf[0], 0x86);

        let decoded: CompletedCommand = rmp_serde::from_slice(&buf).expect("decode");
        assert_eq!(decoded, result);
    }

    #[test]
    fn emit_writes_the_encoded_bytes() {
        let result = assemble(
            supervised(ExitOutcome::Completed { return_code: 0 }),
            Accounting::default(),
        );
        let mut out = Vec::new();
        emit(&result, &mut out).expect("emit");
        assert_eq!(out, encode(&result).expect("encode"));
    }
}
