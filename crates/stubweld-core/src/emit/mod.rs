//! # Body Emission
//!
//! Instruction sequence construction for synthesized stub bodies.
//!
//! [`BodyBuilder`] appends instructions and resolves forward branches through
//! labels. The translation templates build on it:
//!
//! - [`span`]: copies a (pointer, length) wrapper into the host's wrapper type
//! - [`pointer`]: derives a native pointer for a host object reference
//! - [`synth`]: assembles complete stub bodies from a template

pub mod pointer;
pub mod span;
pub mod synth;

use crate::error::EmissionError;
use crate::il::{Instruction, MethodBody, OpCode, Operand, Token};
use crate::metadata::TypeSig;

/// A branch destination, bound to an instruction index by [`BodyBuilder::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Default)]
pub struct BodyBuilder
{
    instructions: Vec<Instruction>,
    locals: Vec<TypeSig>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
}

impl BodyBuilder
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Add a local variable and return its index.
    ///
    /// ## Errors
    ///
    /// Returns [`EmissionError::IndexOverflow`] once the body already holds
    /// `u16::MAX + 1` locals; nothing is added in that case.
    pub fn declare_local(&mut self, ty: TypeSig) -> Result<u16, EmissionError>
    {
        let index = self.locals.len();
        let local = u16::try_from(index).map_err(|_| EmissionError::IndexOverflow { kind: "local", index })?;
        self.locals.push(ty);
        Ok(local)
    }

    pub fn define_label(&mut self) -> Label
    {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next instruction emitted.
    pub fn mark(&mut self, label: Label)
    {
        self.labels[label.0] = Some(self.instructions.len());
    }

    pub fn emit(&mut self, instruction: Instruction) -> &mut Self
    {
        self.instructions.push(instruction);
        self
    }

    pub fn op(&mut self, opcode: OpCode) -> &mut Self
    {
        self.emit(Instruction::simple(opcode))
    }

    pub fn op_token(&mut self, opcode: OpCode, token: Token) -> &mut Self
    {
        self.emit(Instruction::with_token(opcode, token))
    }

    /// Long-form branch to `label`.
    pub fn branch(&mut self, opcode: OpCode, label: Label) -> &mut Self
    {
        self.fixups.push((self.instructions.len(), label));
        self.emit(Instruction::branch(opcode, usize::MAX))
    }

    /// Number of instructions emitted so far.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.instructions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.instructions.is_empty()
    }

    /// Resolve labels and produce the body. `max_stack` is left for the verifier.
    ///
    /// ## Errors
    ///
    /// Returns [`EmissionError::InvalidBranch`] for a branch to an unmarked label.
    pub fn finish(mut self) -> Result<MethodBody, EmissionError>
    {
        for (index, label) in self.fixups {
            let target = self.labels[label.0].ok_or(EmissionError::InvalidBranch {
                index,
                target: usize::MAX,
            })?;
            self.instructions[index].operand = Operand::Target(target);
        }
        Ok(MethodBody {
            max_stack: 0,
            init_locals: !self.locals.is_empty(),
            locals: self.locals,
            instructions: self.instructions,
            regions: Vec::new(),
        })
    }
}
