//! Equation batch envelope.
//!
//! An envelope opens with a 4-byte magic tag, five fixed header fields and
//! `number_of_equations` equation records. Each record carries five data
//! fields plus 10 reserved padding bytes that are skipped and never
//! interpreted. The reply form ([`SolvedBatch`]) replaces each record
//! with a 14-byte solved record: equation id, outcome byte, result-kind
//! byte and the 64-bit result value.

use std::io::{Read, Write};

use crate::calc::{self, Outcome, ResultKind, Solution};

use super::{ProtocolError, wire, wire::Framing};

/// Tag opening every recognized envelope.
pub const MAGIC: u32 = 0xDD77_BB55;

/// Reserved trailing bytes on every equation record.
pub const EQUATION_PADDING: usize = 10;

/// Outcome byte values used by solved records.
const OUTCOME_UNATTEMPTED: u8 = 0x00;
const OUTCOME_SOLVED: u8 = 0x01;
const OUTCOME_FAILED: u8 = 0x02;

/// Result-kind byte values used by solved records.
const KIND_NONE: u8 = 0x00;
const KIND_SIGNED: u8 = 0x01;
const KIND_UNSIGNED: u8 = 0x02;

/// A decoded batch of equations plus its header metadata.
///
/// The envelope owns its equations and, transitively, any solutions
/// attached to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub file_id: u64,
    pub number_of_equations: u64,
    pub flags: u8,
    pub equation_table_offset: u32,
    pub option_header_count: u16,
    pub equations: Vec<UnsolvedEquation>,
}

/// One fixed-layout equation record awaiting evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsolvedEquation {
    pub equation_id: u32,
    pub flags: u8,
    pub left_operand: u64,
    pub operator: u8,
    pub right_operand: u64,
    pub solution: Option<Solution>,
}

impl UnsolvedEquation {
    pub fn new(equation_id: u32, left_operand: u64, operator: u8, right_operand: u64) -> Self {
        Self {
            equation_id,
            flags: 0,
            left_operand,
            operator,
            right_operand,
            solution: None,
        }
    }

    /// Evaluates this equation and attaches the resulting solution.
    pub fn solve(&mut self) {
        self.solution = Some(calc::evaluate(
            self.equation_id,
            self.left_operand,
            self.operator,
            self.right_operand,
        ));
    }

    fn decode<R: Read>(reader: &mut R, framing: Framing) -> Result<Self, ProtocolError> {
        let equation_id = framing.read_u32(reader)?;
        let flags = wire::read_u8(reader)?;
        let left_operand = framing.read_u64(reader)?;
        let operator = wire::read_u8(reader)?;
        let right_operand = framing.read_u64(reader)?;
        // Reserved padding; consumed but never interpreted.
        wire::read_array::<EQUATION_PADDING, _>(reader)?;

        Ok(Self {
            equation_id,
            flags,
            left_operand,
            operator,
            right_operand,
            solution: None,
        })
    }

    fn encode<W: Write>(&self, writer: &mut W, framing: Framing) -> Result<(), ProtocolError> {
        framing.write_u32(writer, self.equation_id)?;
        wire::write_u8(writer, self.flags)?;
        framing.write_u64(writer, self.left_operand)?;
        wire::write_u8(writer, self.operator)?;
        framing.write_u64(writer, self.right_operand)?;
        writer.write_all(&[0; EQUATION_PADDING])?;
        Ok(())
    }
}

impl RequestEnvelope {
    pub fn new(file_id: u64, equations: Vec<UnsolvedEquation>) -> Self {
        Self {
            file_id,
            number_of_equations: equations.len() as u64,
            flags: 0,
            equation_table_offset: 0,
            option_header_count: 0,
            equations,
        }
    }

    /// Decodes an envelope from `reader`.
    ///
    /// The magic tag is checked before anything is built; a mismatch fails
    /// immediately without allocating. Any later field failure aborts the
    /// decode, dropping the partially built batch.
    pub fn decode<R: Read>(reader: &mut R, framing: Framing) -> Result<Self, ProtocolError> {
        let magic = framing.read_u32(reader)?;
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }

        let file_id = framing.read_u64(reader)?;
        let number_of_equations = framing.read_u64(reader)?;
        let flags = wire::read_u8(reader)?;
        let equation_table_offset = framing.read_u32(reader)?;
        let option_header_count = framing.read_u16(reader)?;

        // Grown on demand; the declared count is untrusted input.
        let mut equations = Vec::new();
        for _ in 0..number_of_equations {
            equations.push(UnsolvedEquation::decode(reader, framing)?);
        }

        Ok(Self {
            file_id,
            number_of_equations,
            flags,
            equation_table_offset,
            option_header_count,
            equations,
        })
    }

    /// Evaluates every equation in place. Evaluation is total: failed
    /// equations receive a failed solution and never abort the batch.
    pub fn solve_all(&mut self) {
        for equation in &mut self.equations {
            equation.solve();
        }
    }

    /// Writes the envelope in request (unsolved) form.
    pub fn encode<W: Write>(&self, writer: &mut W, framing: Framing) -> Result<(), ProtocolError> {
        self.encode_head(writer, framing)?;
        for equation in &self.equations {
            equation.encode(writer, framing)?;
        }
        Ok(())
    }

    /// Writes the solved reply: the envelope header followed by one solved
    /// record per equation.
    pub fn encode_reply<W: Write>(
        &self,
        writer: &mut W,
        framing: Framing,
    ) -> Result<(), ProtocolError> {
        self.encode_head(writer, framing)?;
        for equation in &self.equations {
            let record = match &equation.solution {
                Some(solution) => SolvedRecord::from(solution),
                None => SolvedRecord {
                    equation_id: equation.equation_id,
                    outcome: OUTCOME_UNATTEMPTED,
                    kind: KIND_NONE,
                    value: 0,
                },
            };
            record.encode(writer, framing)?;
        }
        Ok(())
    }

    fn encode_head<W: Write>(&self, writer: &mut W, framing: Framing) -> Result<(), ProtocolError> {
        framing.write_u32(writer, MAGIC)?;
        framing.write_u64(writer, self.file_id)?;
        framing.write_u64(writer, self.equations.len() as u64)?;
        wire::write_u8(writer, self.flags)?;
        framing.write_u32(writer, self.equation_table_offset)?;
        framing.write_u16(writer, self.option_header_count)?;
        Ok(())
    }
}

/// One solved-equation record as it appears in replies and solved files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolvedRecord {
    pub equation_id: u32,
    pub outcome: u8,
    pub kind: u8,
    pub value: u64,
}

impl SolvedRecord {
    pub fn is_solved(&self) -> bool {
        self.outcome == OUTCOME_SOLVED
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == OUTCOME_FAILED
    }

    fn decode<R: Read>(reader: &mut R, framing: Framing) -> Result<Self, ProtocolError> {
        let equation_id = framing.read_u32(reader)?;
        let outcome = wire::read_u8(reader)?;
        let kind = wire::read_u8(reader)?;
        let value = framing.read_u64(reader)?;

        Ok(Self {
            equation_id,
            outcome,
            kind,
            value,
        })
    }

    fn encode<W: Write>(&self, writer: &mut W, framing: Framing) -> Result<(), ProtocolError> {
        framing.write_u32(writer, self.equation_id)?;
        wire::write_u8(writer, self.outcome)?;
        wire::write_u8(writer, self.kind)?;
        framing.write_u64(writer, self.value)?;
        Ok(())
    }
}

impl From<&Solution> for SolvedRecord {
    fn from(solution: &Solution) -> Self {
        let outcome = match solution.outcome {
            Outcome::Unattempted => OUTCOME_UNATTEMPTED,
            Outcome::Solved => OUTCOME_SOLVED,
            Outcome::Failed => OUTCOME_FAILED,
        };
        let kind = match solution.kind {
            ResultKind::None => KIND_NONE,
            ResultKind::Signed => KIND_SIGNED,
            ResultKind::Unsigned => KIND_UNSIGNED,
        };
        let value = match solution.outcome {
            Outcome::Solved => solution.value,
            _ => 0,
        };

        Self {
            equation_id: solution.equation_id,
            outcome,
            kind,
            value,
        }
    }
}

/// A decoded reply: envelope header metadata plus solved records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolvedBatch {
    pub file_id: u64,
    pub flags: u8,
    pub records: Vec<SolvedRecord>,
}

impl SolvedBatch {
    /// Decodes a solved envelope, enforcing the same magic-first rule as
    /// the request decoder.
    pub fn decode<R: Read>(reader: &mut R, framing: Framing) -> Result<Self, ProtocolError> {
        let magic = framing.read_u32(reader)?;
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }

        let file_id = framing.read_u64(reader)?;
        let count = framing.read_u64(reader)?;
        let flags = wire::read_u8(reader)?;
        let _equation_table_offset = framing.read_u32(reader)?;
        let _option_header_count = framing.read_u16(reader)?;

        let mut records = Vec::new();
        for _ in 0..count {
            records.push(SolvedRecord::decode(reader, framing)?);
        }

        Ok(Self {
            file_id,
            flags,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::calc::Operator;

    use super::*;

    fn sample() -> RequestEnvelope {
        RequestEnvelope::new(
            0xFEED_F00D,
            vec![
                UnsolvedEquation::new(1, 10, Operator::Add as u8, 10),
                UnsolvedEquation::new(2, 42, Operator::Divide as u8, 0),
                UnsolvedEquation::new(3, 0xFFFF_FFFF_FFFF_FFFF, Operator::RotateLeft as u8, 1),
            ],
        )
    }

    #[test]
    fn bad_magic_rejected_outright() {
        let mut bytes = Vec::new();
        sample().encode(&mut bytes, Framing::Network).unwrap();
        bytes[0] = 0xAA;

        let err = RequestEnvelope::decode(&mut Cursor::new(bytes), Framing::Network).unwrap_err();
        assert!(matches!(err, ProtocolError::BadMagic(_)));
    }

    #[test]
    fn round_trip_network_framing() {
        let envelope = sample();
        let mut bytes = Vec::new();
        envelope.encode(&mut bytes, Framing::Network).unwrap();

        let decoded = RequestEnvelope::decode(&mut Cursor::new(bytes), Framing::Network).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.number_of_equations, 3);
    }

    #[test]
    fn round_trip_file_framing() {
        let envelope = sample();
        let mut bytes = Vec::new();
        envelope.encode(&mut bytes, Framing::File).unwrap();

        let decoded = RequestEnvelope::decode(&mut Cursor::new(bytes), Framing::File).unwrap();
        assert_eq!(decoded, envelope);
    }

    // The network framing byte-swaps operand fields; the file framing keeps
    // them in host order. The layouts intentionally differ on the wire.
    #[test]
    #[cfg(target_endian = "little")]
    fn framings_disagree_on_the_wire() {
        let envelope = sample();

        let mut network = Vec::new();
        envelope.encode(&mut network, Framing::Network).unwrap();
        let mut file = Vec::new();
        envelope.encode(&mut file, Framing::File).unwrap();

        assert_eq!(network.len(), file.len());
        assert_ne!(network, file);
        assert!(matches!(
            RequestEnvelope::decode(&mut Cursor::new(file), Framing::Network),
            Err(ProtocolError::BadMagic(_))
        ));
    }

    #[test]
    fn truncated_record_aborts_decoding() {
        let mut bytes = Vec::new();
        sample().encode(&mut bytes, Framing::Network).unwrap();
        // Cut mid-way through the last record's right operand.
        bytes.truncate(bytes.len() - 15);

        let err = RequestEnvelope::decode(&mut Cursor::new(bytes), Framing::Network).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[test]
    fn declared_count_beyond_stream_fails() {
        // Encode a head by hand that lies about the equation count.
        let mut bytes = Vec::new();
        Framing::Network.write_u32(&mut bytes, MAGIC).unwrap();
        Framing::Network.write_u64(&mut bytes, 1).unwrap();
        Framing::Network.write_u64(&mut bytes, u64::MAX).unwrap();
        bytes.push(0);
        Framing::Network.write_u32(&mut bytes, 0).unwrap();
        Framing::Network.write_u16(&mut bytes, 0).unwrap();

        let err = RequestEnvelope::decode(&mut Cursor::new(bytes), Framing::Network).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[test]
    fn padding_content_is_ignored() {
        let equation = UnsolvedEquation::new(9, 6, Operator::Multiply as u8, 7);
        let mut bytes = Vec::new();
        equation.encode(&mut bytes, Framing::Network).unwrap();
        // Scribble over the padding region; decode must not care.
        let len = bytes.len();
        for byte in &mut bytes[len - EQUATION_PADDING..] {
            *byte = 0xEE;
        }

        let decoded = UnsolvedEquation::decode(&mut Cursor::new(bytes), Framing::Network).unwrap();
        assert_eq!(decoded, equation);
    }

    #[test]
    fn reply_round_trip() {
        let mut envelope = sample();
        envelope.solve_all();

        let mut bytes = Vec::new();
        envelope.encode_reply(&mut bytes, Framing::Network).unwrap();

        let batch = SolvedBatch::decode(&mut Cursor::new(bytes), Framing::Network).unwrap();
        assert_eq!(batch.file_id, 0xFEED_F00D);
        assert_eq!(batch.records.len(), 3);

        assert!(batch.records[0].is_solved());
        assert_eq!(batch.records[0].value, 20);
        assert_eq!(batch.records[0].kind, 0x01);

        // Division by zero fails alone; the value field is zeroed.
        assert!(batch.records[1].is_failed());
        assert_eq!(batch.records[1].value, 0);

        assert!(batch.records[2].is_solved());
        assert_eq!(batch.records[2].value, 0xFFFF_FFFF_FFFF_FFFF);
        assert_eq!(batch.records[2].kind, 0x02);
    }

    #[test]
    fn unattempted_equations_reply_as_such() {
        let envelope = sample();

        let mut bytes = Vec::new();
        envelope.encode_reply(&mut bytes, Framing::Network).unwrap();

        let batch = SolvedBatch::decode(&mut Cursor::new(bytes), Framing::Network).unwrap();
        assert!(batch.records.iter().all(|r| r.outcome == 0x00));
    }
}
