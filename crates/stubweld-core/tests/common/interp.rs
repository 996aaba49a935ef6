//! A small evaluator for synthesized bodies.
//!
//! Calls into other modules are not executed: they are recorded and answered
//! by a caller-supplied closure. Calls to methods of the evaluated module run
//! recursively. Instance constructors called on a local address replace that
//! local with the closure's answer.

use std::collections::BTreeMap;

use stubweld_core::il::{OpCode, Token};
use stubweld_core::metadata::{FieldId, MemberRefId, MethodId, Module};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value
{
    Null,
    Int(i64),
    /// Object or value type instance, fields by name
    Object(BTreeMap<String, Value>),
    LocalAddr(u16),
}

impl Value
{
    pub fn object<const N: usize>(fields: [(&str, Value); N]) -> Self
    {
        Value::Object(fields.into_iter().map(|(name, value)| (name.to_string(), value)).collect())
    }

    fn is_true(&self) -> bool
    {
        match self {
            Value::Null => false,
            Value::Int(n) => *n != 0,
            Value::Object(_) | Value::LocalAddr(_) => true,
        }
    }
}

/// One recorded call out of the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call
{
    /// `Namespace.Type::Method`
    pub callee: String,
    pub args: Vec<Value>,
}

pub struct Evaluator<'m, F>
{
    module: &'m Module,
    external: F,
    pub calls: Vec<Call>,
}

impl<'m, F> Evaluator<'m, F>
where
    F: FnMut(&str, &[Value]) -> Value,
{
    pub fn new(module: &'m Module, external: F) -> Self
    {
        Self {
            module,
            external,
            calls: Vec::new(),
        }
    }

    pub fn callees(&self) -> Vec<&str>
    {
        self.calls.iter().map(|call| call.callee.as_str()).collect()
    }

    /// Run `method` to completion. `Err` carries the reason execution stopped.
    pub fn invoke(&mut self, method: MethodId, args: Vec<Value>) -> Result<Option<Value>, String>
    {
        let module = self.module;
        let def = module.method(method);
        let body = def.body.as_ref().ok_or_else(|| format!("{} has no body", def.name))?;
        let returns_value = !def.sig.ret.is_void();
        let mut locals = vec![Value::Int(0); body.locals.len()];
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0;

        loop {
            let instruction = body.instructions.get(pc).ok_or("ran off the end of the body")?;
            pc += 1;
            let opcode = instruction.opcode;
            match opcode {
                OpCode::Ldarg0 | OpCode::Ldarg1 | OpCode::Ldarg2 | OpCode::Ldarg3 | OpCode::LdargS | OpCode::Ldarg => {
                    let index = usize::from(instruction.arg_index().ok_or("ldarg without index")?);
                    stack.push(args.get(index).cloned().ok_or("argument out of range")?);
                }
                OpCode::Ldloc0 | OpCode::Ldloc1 | OpCode::Ldloc2 | OpCode::Ldloc3 | OpCode::LdlocS | OpCode::Ldloc => {
                    let index = usize::from(instruction.local_index().ok_or("ldloc without index")?);
                    stack.push(locals[index].clone());
                }
                OpCode::Stloc0 | OpCode::Stloc1 | OpCode::Stloc2 | OpCode::Stloc3 | OpCode::StlocS | OpCode::Stloc => {
                    let index = usize::from(instruction.local_index().ok_or("stloc without index")?);
                    locals[index] = pop(&mut stack)?;
                }
                OpCode::LdlocaS | OpCode::Ldloca => {
                    stack.push(Value::LocalAddr(instruction.local_index().ok_or("ldloca without index")?));
                }
                OpCode::Ldnull => stack.push(Value::Null),
                OpCode::ConvI | OpCode::ConvI8 | OpCode::ConvU | OpCode::Nop => {}
                OpCode::Pop => {
                    pop(&mut stack)?;
                }
                OpCode::Br | OpCode::BrS => pc = target(instruction)?,
                OpCode::Brtrue | OpCode::BrtrueS => {
                    if pop(&mut stack)?.is_true() {
                        pc = target(instruction)?;
                    }
                }
                OpCode::Brfalse | OpCode::BrfalseS => {
                    if !pop(&mut stack)?.is_true() {
                        pc = target(instruction)?;
                    }
                }
                OpCode::Ldfld => {
                    let name = field_name(module, instruction.token().ok_or("ldfld without token")?)?;
                    let value = match pop(&mut stack)? {
                        Value::Object(fields) => fields.get(&name).cloned(),
                        Value::LocalAddr(local) => match &locals[usize::from(local)] {
                            Value::Object(fields) => fields.get(&name).cloned(),
                            _ => None,
                        },
                        other => return Err(format!("ldfld {name} on {other:?}")),
                    };
                    stack.push(value.unwrap_or(Value::Int(0)));
                }
                OpCode::Call | OpCode::Callvirt => {
                    let token = instruction.token().ok_or("call without token")?;
                    if let Some(value) = self.call(token, &mut stack, &mut locals)? {
                        stack.push(value);
                    }
                }
                OpCode::Newobj => {
                    let token = instruction.token().ok_or("newobj without token")?;
                    let callee = member_name(module, token)?;
                    return Err(format!("constructs {callee} and throws"));
                }
                OpCode::Throw => return Err("throws".to_string()),
                OpCode::Ret => {
                    return Ok(if returns_value { Some(pop(&mut stack)?) } else { None });
                }
                _ => {
                    if let Some(value) = instruction.i4_value() {
                        stack.push(Value::Int(i64::from(value)));
                    } else {
                        return Err(format!("unsupported instruction {instruction}"));
                    }
                }
            }
        }
    }

    fn call(&mut self, token: Token, stack: &mut Vec<Value>, locals: &mut [Value]) -> Result<Option<Value>, String>
    {
        let module = self.module;
        let row = token.row().ok_or("null token")?;
        if token.table() == Token::METHOD_DEF {
            let method = MethodId::new(row);
            let count = module.method(method).sig.stack_inputs();
            let args = stack.split_off(stack.len().checked_sub(count).ok_or("stack underflow")?);
            return self.invoke(method, args);
        }

        let member = MemberRefId::new(row);
        let sig = module
            .member_ref(member)
            .sig
            .as_method()
            .ok_or("call through a field reference")?;
        let callee = module.member_ref_full_name(member);
        let count = sig.stack_inputs();
        let mut args = stack.split_off(stack.len().checked_sub(count).ok_or("stack underflow")?);

        if module.member_ref(member).name == ".ctor" {
            if let Some(Value::LocalAddr(local)) = args.first().cloned() {
                let args = args.split_off(1);
                let constructed = (self.external)(&callee, &args);
                self.calls.push(Call { callee, args });
                locals[usize::from(local)] = constructed;
                return Ok(None);
            }
        }

        for arg in &mut args {
            if let Value::LocalAddr(local) = arg {
                *arg = locals[usize::from(*local)].clone();
            }
        }
        let result = (self.external)(&callee, &args);
        self.calls.push(Call { callee, args });
        Ok((!sig.ret.is_void()).then_some(result))
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, String>
{
    stack.pop().ok_or_else(|| "stack underflow".to_string())
}

fn target(instruction: &stubweld_core::il::Instruction) -> Result<usize, String>
{
    instruction.target().ok_or_else(|| "branch without target".to_string())
}

fn field_name(module: &Module, token: Token) -> Result<String, String>
{
    let row = token.row().ok_or("null token")?;
    match token.table() {
        Token::FIELD => Ok(module.field(FieldId::new(row)).name.clone()),
        Token::MEMBER_REF => Ok(module.member_ref(MemberRefId::new(row)).name.clone()),
        table => Err(format!("table {table:#x} is not a field")),
    }
}

fn member_name(module: &Module, token: Token) -> Result<String, String>
{
    let row = token.row().ok_or("null token")?;
    match token.table() {
        Token::MEMBER_REF => Ok(module.member_ref_full_name(MemberRefId::new(row))),
        Token::METHOD_DEF => Ok(module.method_full_name(MethodId::new(row))),
        table => Err(format!("table {table:#x} is not a method")),
    }
}
