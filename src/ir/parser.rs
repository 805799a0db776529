// This module reads the textual IR: an LLVM-assembly-like subset with one instruction
// per line. Names may be used before they are defined. Global and function names are
// collected by a line scan over the whole text before parsing starts, and each function
// body is scanned for its labels and `%name =` definitions when its opening brace is
// reached, so every reference resolves to its final id the moment it is read. Errors
// carry the 1-based line of the offending token.

//! Parser for the textual IR.

use std::collections::HashMap;

use super::{
    BinaryOp, Block, BlockId, CastOp, ConstGep, FuncId, Function, Global, GlobalId, Initializer,
    Inst, InstId, InstKind, IntPredicate, Module, Param, Type, Value,
};
use crate::core::{CompileError, CompileResult};

/// Linkage, visibility and attribute words accepted and ignored before types and names.
const IGNORED_WORDS: &[&str] = &[
    "dso_local",
    "dso_preemptable",
    "internal",
    "private",
    "common",
    "weak",
    "linkonce_odr",
    "weak_odr",
    "hidden",
    "protected",
    "local_unnamed_addr",
    "unnamed_addr",
    "noundef",
    "nonnull",
    "nocapture",
    "readonly",
    "readnone",
    "writeonly",
    "signext",
    "zeroext",
    "noalias",
    "immarg",
    "returned",
    "fastcc",
    "ccc",
];

pub fn parse_module(text: &str) -> CompileResult<Module> {
    let mut parser = Parser::new(text);
    parser.scan_top_level()?;
    parser.parse()?;
    Ok(parser.module)
}

/// Saved parser position for backtracking.
#[derive(Clone, Copy)]
struct Mark {
    pos: usize,
    line: u32,
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    line: u32,
    module: Module,

    globals: HashMap<&'a str, GlobalId>,
    functions: HashMap<&'a str, FuncId>,

    // Per-function state, reset for every definition.
    params: HashMap<&'a str, u32>,
    locals: HashMap<&'a str, InstId>,
    block_names: HashMap<&'a str, BlockId>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            line: 1,
            module: Module::new(),
            globals: HashMap::new(),
            functions: HashMap::new(),
            params: HashMap::new(),
            locals: HashMap::new(),
            block_names: HashMap::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    /// Collect global and function names in definition order.
    fn scan_top_level(&mut self) -> CompileResult<()> {
        let text = self.text;
        for (idx, raw) in text.lines().enumerate() {
            let line = idx as u32 + 1;
            let content = strip_comment(raw).trim();
            if let Some(rest) = content.strip_prefix('@') {
                let name = leading_name(rest);
                let id = GlobalId(self.globals.len() as u32);
                if self.globals.insert(name, id).is_some() {
                    return Err(CompileError::Parse {
                        line,
                        message: format!("duplicate global @{name}"),
                    });
                }
            } else if content.starts_with("define ") || content.starts_with("declare ") {
                let Some(at) = content.find('@') else {
                    return Err(CompileError::Parse {
                        line,
                        message: "function header without a name".to_string(),
                    });
                };
                let name = leading_name(&content[at + 1..]);
                let id = FuncId(self.functions.len() as u32);
                if self.functions.insert(name, id).is_some() {
                    return Err(CompileError::Parse {
                        line,
                        message: format!("duplicate function @{name}"),
                    });
                }
            }
        }
        Ok(())
    }

    fn parse(&mut self) -> CompileResult<()> {
        loop {
            self.skip_whitespace(true);
            if self.is_eof() {
                return Ok(());
            }
            if self.peek() == Some('@') {
                self.parse_global()?;
                continue;
            }
            let mark = self.mark();
            let word = self.read_word();
            match word {
                "define" => self.parse_function(false)?,
                "declare" => self.parse_function(true)?,
                "target" | "source_filename" | "attributes" => self.skip_line(),
                "" if self.peek() == Some('!') => self.skip_line(),
                "" if self.peek() == Some('%') => {
                    return Err(self.error("named types are not supported"));
                }
                _ => {
                    self.reset(mark);
                    return Err(self.error(format!("unexpected top-level token '{}'", self.rest_of_line())));
                }
            }
        }
    }

    // Character-level helpers.

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek() {
            if ch == '\n' {
                self.line += 1;
            }
            self.pos += ch.len_utf8();
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
        }
    }

    fn reset(&mut self, mark: Mark) {
        self.pos = mark.pos;
        self.line = mark.line;
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.peek() {
            match ch {
                ';' => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.advance();
                    }
                }
                '\n' if !skip_newlines => break,
                c if c.is_whitespace() => self.advance(),
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.peek() {
            self.advance();
            if ch == '\n' {
                break;
            }
        }
    }

    fn rest_of_line(&self) -> &'a str {
        let rest = &self.text[self.pos..];
        rest.lines().next().unwrap_or("").trim()
    }

    /// Consumes `ch` after any whitespace; on a miss the position is left untouched.
    fn try_read(&mut self, ch: char) -> bool {
        let mark = self.mark();
        self.skip_whitespace(true);
        if self.peek() == Some(ch) {
            self.advance();
            true
        } else {
            self.reset(mark);
            false
        }
    }

    fn expect(&mut self, ch: char) -> CompileResult<()> {
        if self.try_read(ch) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found '{}'", ch, self.rest_of_line())))
        }
    }

    /// Reads `[A-Za-z0-9_.$-]*`; empty when the next character starts no word.
    fn read_word(&mut self) -> &'a str {
        self.skip_whitespace(true);
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if is_name_char(ch) {
                self.advance();
            } else {
                break;
            }
        }
        &self.text[start..self.pos]
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        let mark = self.mark();
        if self.read_word() == keyword {
            true
        } else {
            self.reset(mark);
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> CompileResult<()> {
        if self.try_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found '{}'", keyword, self.rest_of_line())))
        }
    }

    fn read_sigiled(&mut self, sigil: char) -> CompileResult<&'a str> {
        self.expect(sigil)?;
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if is_name_char(ch) {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error(format!("expected a name after '{sigil}'")));
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_number(&mut self) -> CompileResult<i64> {
        self.skip_whitespace(true);
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let digits = &self.text[start..self.pos];
        digits
            .parse::<i64>()
            .or_else(|_| digits.parse::<u64>().map(|v| v as i64))
            .map_err(|_| self.error(format!("expected an integer, found '{digits}'")))
    }

    /// Skips linkage and attribute words, including `align N` and `#N` groups.
    fn skip_attributes(&mut self) {
        loop {
            let mark = self.mark();
            self.skip_whitespace(true);
            if self.peek() == Some('#') {
                self.advance();
                self.read_word();
                continue;
            }
            let word = self.read_word();
            if word == "align" {
                if self.read_number().is_err() {
                    self.reset(mark);
                    return;
                }
            } else if !IGNORED_WORDS.contains(&word) {
                self.reset(mark);
                return;
            }
        }
    }

    /// Consumes a trailing `, align N` or `, !meta !N` and checks the line ends.
    fn finish_line(&mut self) -> CompileResult<()> {
        self.skip_whitespace(false);
        if self.peek() == Some(',') {
            self.advance();
            self.skip_whitespace(false);
            let mark = self.mark();
            if self.peek() == Some('!') || self.read_word() == "align" {
                self.skip_line();
                return Ok(());
            }
            self.reset(mark);
            return Err(self.error(format!("unexpected trailing text '{}'", self.rest_of_line())));
        }
        match self.peek() {
            None => Ok(()),
            Some('\n') => {
                self.advance();
                Ok(())
            }
            Some(_) => Err(self.error(format!("unexpected trailing text '{}'", self.rest_of_line()))),
        }
    }

    /// A separating comma that is followed by another operand, not metadata.
    fn try_operand_comma(&mut self) -> bool {
        let mark = self.mark();
        self.skip_whitespace(false);
        if self.peek() != Some(',') {
            self.reset(mark);
            return false;
        }
        self.advance();
        self.skip_whitespace(false);
        let after = self.mark();
        let trailer = self.peek() == Some('!') || self.read_word() == "align";
        self.reset(if trailer { mark } else { after });
        !trailer
    }

    // Types and operands.

    fn parse_type(&mut self) -> CompileResult<Type> {
        self.skip_whitespace(true);
        let mut ty = match self.peek() {
            Some('[') => {
                self.advance();
                let count = self.read_number()?;
                let count = u64::try_from(count)
                    .map_err(|_| self.error(format!("negative array length {count}")))?;
                self.expect_keyword("x")?;
                let elem = self.parse_type()?;
                self.expect(']')?;
                Type::Array(count, Box::new(elem))
            }
            Some('{') => {
                self.advance();
                let mut fields = Vec::new();
                if !self.try_read('}') {
                    loop {
                        fields.push(self.parse_type()?);
                        if !self.try_read(',') {
                            break;
                        }
                    }
                    self.expect('}')?;
                }
                Type::Struct(fields)
            }
            _ => {
                let word = self.read_word();
                match word {
                    "void" => Type::Void,
                    "ptr" => return Err(self.error("opaque pointer types are not supported")),
                    w => match w.strip_prefix('i').and_then(|bits| bits.parse::<u32>().ok()) {
                        Some(bits) if bits > 0 => Type::Int(bits),
                        _ => return Err(self.error(format!("unknown type '{w}'"))),
                    },
                }
            }
        };
        // A type may end the line, so the pointer suffix never looks past it.
        loop {
            self.skip_whitespace(false);
            if self.peek() != Some('*') {
                break;
            }
            self.advance();
            ty = ty.ptr_to();
        }
        Ok(ty)
    }

    fn parse_value(&mut self) -> CompileResult<Value> {
        self.skip_whitespace(true);
        match self.peek() {
            Some('%') => {
                let name = self.read_sigiled('%')?;
                self.local(name)
            }
            Some('@') => {
                let name = self.read_sigiled('@')?;
                if let Some(&id) = self.globals.get(name) {
                    Ok(Value::Global(id))
                } else if self.functions.contains_key(name) {
                    Err(self.error(format!("function @{name} used as a value")))
                } else {
                    Err(self.error(format!("undefined global @{name}")))
                }
            }
            Some(c) if c == '-' || c.is_ascii_digit() => Ok(Value::Const(self.read_number()?)),
            _ => {
                let word = self.read_word();
                match word {
                    "true" => Ok(Value::Const(1)),
                    "false" | "null" => Ok(Value::Const(0)),
                    "getelementptr" => self.parse_const_gep(),
                    other => Err(self.error(format!("unexpected operand '{other}'"))),
                }
            }
        }
    }

    fn parse_typed_value(&mut self) -> CompileResult<(Type, Value)> {
        let ty = self.parse_type()?;
        self.skip_attributes();
        let value = self.parse_value()?;
        Ok((ty, value))
    }

    /// `getelementptr [inbounds] (T, T* @g, i64 0, ...)` after the keyword.
    fn parse_const_gep(&mut self) -> CompileResult<Value> {
        self.try_keyword("inbounds");
        self.expect('(')?;
        let source_ty = self.parse_type()?;
        self.expect(',')?;
        let (_, base) = self.parse_typed_value()?;
        let Value::Global(base) = base else {
            return Err(self.error("constant getelementptr base must be a global"));
        };
        let mut indices = Vec::new();
        while self.try_read(',') {
            match self.parse_typed_value()? {
                (_, Value::Const(idx)) => indices.push(idx),
                _ => return Err(self.error("constant getelementptr index must be an integer")),
            }
        }
        self.expect(')')?;
        Ok(Value::ConstGep(Box::new(ConstGep {
            source_ty,
            base,
            indices,
        })))
    }

    fn local(&self, name: &str) -> CompileResult<Value> {
        if let Some(&idx) = self.params.get(name) {
            Ok(Value::Arg(idx))
        } else if let Some(&id) = self.locals.get(name) {
            Ok(Value::Inst(id))
        } else {
            Err(self.error(format!("undefined value %{name}")))
        }
    }

    fn read_label(&mut self) -> CompileResult<BlockId> {
        self.expect_keyword("label")?;
        let name = self.read_sigiled('%')?;
        self.block_names
            .get(name)
            .copied()
            .ok_or_else(|| self.error(format!("undefined block %{name}")))
    }

    // Top-level entities.

    fn parse_global(&mut self) -> CompileResult<()> {
        let name = self.read_sigiled('@')?;
        self.expect('=')?;
        let mut external = false;
        let constant = loop {
            self.skip_attributes();
            match self.read_word() {
                "external" | "extern_weak" => external = true,
                "global" => break false,
                "constant" => break true,
                other => return Err(self.error(format!("unexpected '{other}' in global @{name}"))),
            }
        };
        let ty = self.parse_type()?;
        let init = if external {
            Initializer::Opaque
        } else {
            self.parse_initializer()?
        };
        log::trace!("parsed global @{name}: {ty}");
        self.module.globals.push(Global {
            name: name.to_string(),
            ty,
            constant,
            init,
        });
        self.finish_line()
    }

    fn parse_initializer(&mut self) -> CompileResult<Initializer> {
        self.skip_whitespace(false);
        match self.peek() {
            Some('[') => {
                self.advance();
                let mut values = Vec::new();
                if !self.try_read(']') {
                    loop {
                        match self.parse_typed_value()? {
                            (_, Value::Const(v)) => values.push(v),
                            _ => return Err(self.error("array initializer element must be an integer")),
                        }
                        if !self.try_read(',') {
                            break;
                        }
                    }
                    self.expect(']')?;
                }
                Ok(Initializer::Array(values))
            }
            Some(c) if c == '-' || c.is_ascii_digit() => Ok(Initializer::Int(self.read_number()?)),
            _ => {
                let mark = self.mark();
                match self.read_word() {
                    "zeroinitializer" | "null" | "false" => Ok(Initializer::Zero),
                    "true" => Ok(Initializer::Int(1)),
                    _ => {
                        // String data and other constant forms have no cell representation.
                        self.reset(mark);
                        while !matches!(self.peek(), None | Some('\n')) {
                            self.advance();
                        }
                        Ok(Initializer::Opaque)
                    }
                }
            }
        }
    }

    fn parse_function(&mut self, declaration: bool) -> CompileResult<()> {
        self.skip_attributes();
        let ret = self.parse_type()?;
        self.skip_attributes();
        let name = self.read_sigiled('@')?;
        self.expect('(')?;

        self.params.clear();
        let mut params = Vec::new();
        if !self.try_read(')') {
            loop {
                self.skip_whitespace(true);
                if self.text[self.pos..].starts_with("...") {
                    return Err(self.error(format!("variadic function @{name} is not supported")));
                }
                let ty = self.parse_type()?;
                self.skip_attributes();
                self.skip_whitespace(true);
                let param_name = if self.peek() == Some('%') {
                    let param = self.read_sigiled('%')?;
                    if self.params.insert(param, params.len() as u32).is_some() {
                        return Err(self.error(format!("duplicate parameter %{param}")));
                    }
                    param.to_string()
                } else if declaration {
                    String::new()
                } else {
                    return Err(self.error(format!("unnamed parameter in definition of @{name}")));
                };
                params.push(Param {
                    name: param_name,
                    ty,
                });
                if !self.try_read(',') {
                    break;
                }
            }
            self.expect(')')?;
        }

        let mut function = Function {
            name: name.to_string(),
            ret,
            params,
            blocks: Vec::new(),
            declaration,
        };
        if declaration {
            self.skip_line();
        } else {
            // Attributes and groups up to the opening brace.
            while !matches!(self.peek(), None | Some('{') | Some('\n')) {
                self.advance();
            }
            self.expect('{')?;
            self.skip_line();
            self.scan_body()?;
            function.blocks = self.parse_body()?;
        }
        log::debug!(
            "parsed {} @{} with {} block(s)",
            if declaration { "declaration" } else { "function" },
            function.name,
            function.blocks.len()
        );
        self.module.functions.push(function);
        Ok(())
    }

    /// Assign block ids and result ids for the body starting at the current line.
    fn scan_body(&mut self) -> CompileResult<()> {
        self.locals.clear();
        self.block_names.clear();
        let mut next_inst = self.module.insts.len() as u32;
        let mut has_block = false;
        let mut block_count = 0u32;

        let text = self.text;
        for (offset, raw) in text[self.pos..].lines().enumerate() {
            let line = self.line + offset as u32;
            let content = strip_comment(raw).trim();
            if content.is_empty() {
                continue;
            }
            if content.starts_with('}') {
                return Ok(());
            }
            if let Some(label) = content.strip_suffix(':') {
                if label.chars().all(is_name_char) {
                    if self.block_names.insert(label, BlockId(block_count)).is_some() {
                        return Err(CompileError::Parse {
                            line,
                            message: format!("duplicate block {label}"),
                        });
                    }
                    block_count += 1;
                    has_block = true;
                    continue;
                }
            }
            if !has_block {
                block_count += 1;
                has_block = true;
            }
            if let Some(rest) = content.strip_prefix('%') {
                let name = leading_name(rest);
                if rest[name.len()..].trim_start().starts_with('=')
                    && self.locals.insert(name, InstId(next_inst)).is_some()
                {
                    return Err(CompileError::Parse {
                        line,
                        message: format!("duplicate definition of %{name}"),
                    });
                }
            }
            next_inst += 1;
        }
        Err(self.error("function body is not closed"))
    }

    fn parse_body(&mut self) -> CompileResult<Vec<Block>> {
        let mut blocks: Vec<Block> = Vec::new();
        loop {
            self.skip_whitespace(true);
            match self.peek() {
                None => return Err(self.error("function body is not closed")),
                Some('}') => {
                    self.advance();
                    return Ok(blocks);
                }
                _ => {}
            }

            let mark = self.mark();
            let word = self.read_word();
            if !word.is_empty() && self.peek() == Some(':') {
                self.advance();
                blocks.push(Block {
                    name: word.to_string(),
                    insts: Vec::new(),
                });
                continue;
            }
            self.reset(mark);

            if blocks.is_empty() {
                blocks.push(Block {
                    name: "entry".to_string(),
                    insts: Vec::new(),
                });
            }
            let id = self.parse_instruction()?;
            if let Some(block) = blocks.last_mut() {
                block.insts.push(id);
            }
        }
    }

    fn parse_instruction(&mut self) -> CompileResult<InstId> {
        let line = self.line;
        self.skip_whitespace(false);
        let name = if self.peek() == Some('%') {
            let name = self.read_sigiled('%')?;
            self.expect('=')?;
            Some(name)
        } else {
            None
        };

        let opcode = self.read_word();
        let kind = match opcode {
            "alloca" => {
                let allocated = self.parse_type()?;
                InstKind::Alloca { allocated }
            }
            "load" => {
                self.try_keyword("volatile");
                let ty = self.parse_type()?;
                self.expect(',')?;
                let (_, ptr) = self.parse_typed_value()?;
                InstKind::Load { ty, ptr }
            }
            "store" => {
                self.try_keyword("volatile");
                let (ty, value) = self.parse_typed_value()?;
                self.expect(',')?;
                let (_, ptr) = self.parse_typed_value()?;
                InstKind::Store { ty, value, ptr }
            }
            "icmp" => {
                let word = self.read_word();
                let pred = IntPredicate::parse(word)
                    .ok_or_else(|| self.error(format!("unknown icmp predicate '{word}'")))?;
                let (_, lhs) = self.parse_typed_value()?;
                self.expect(',')?;
                let rhs = self.parse_value()?;
                InstKind::ICmp { pred, lhs, rhs }
            }
            "getelementptr" => {
                self.try_keyword("inbounds");
                let source_ty = self.parse_type()?;
                self.expect(',')?;
                let (_, base) = self.parse_typed_value()?;
                let mut indices = Vec::new();
                while self.try_operand_comma() {
                    let (_, index) = self.parse_typed_value()?;
                    indices.push(index);
                }
                InstKind::GetElementPtr {
                    source_ty,
                    base,
                    indices,
                }
            }
            "call" | "tail" | "musttail" | "notail" => {
                if opcode != "call" {
                    self.expect_keyword("call")?;
                }
                self.skip_attributes();
                self.parse_type()?;
                self.skip_attributes();
                let callee_name = self.read_sigiled('@')?;
                let callee = *self
                    .functions
                    .get(callee_name)
                    .ok_or_else(|| self.error(format!("undefined function @{callee_name}")))?;
                self.expect('(')?;
                let mut args = Vec::new();
                if !self.try_read(')') {
                    loop {
                        let (_, arg) = self.parse_typed_value()?;
                        args.push(arg);
                        if !self.try_read(',') {
                            break;
                        }
                    }
                    self.expect(')')?;
                }
                // Function attribute groups such as `#3`.
                while !matches!(self.peek(), None | Some('\n') | Some(',') | Some(';')) {
                    self.advance();
                }
                InstKind::Call { callee, args }
            }
            "phi" => {
                let ty = self.parse_type()?;
                let mut incoming = Vec::new();
                loop {
                    self.expect('[')?;
                    let value = self.parse_value()?;
                    self.expect(',')?;
                    let block_name = self.read_sigiled('%')?;
                    let block = self
                        .block_names
                        .get(block_name)
                        .copied()
                        .ok_or_else(|| self.error(format!("undefined block %{block_name}")))?;
                    self.expect(']')?;
                    incoming.push((value, block));
                    if !self.try_operand_comma() {
                        break;
                    }
                }
                InstKind::Phi { ty, incoming }
            }
            "br" => {
                let mark = self.mark();
                if self.read_word() == "label" {
                    self.reset(mark);
                    let target = self.read_label()?;
                    InstKind::Br { target }
                } else {
                    self.reset(mark);
                    let (_, cond) = self.parse_typed_value()?;
                    self.expect(',')?;
                    let if_true = self.read_label()?;
                    self.expect(',')?;
                    let if_false = self.read_label()?;
                    InstKind::CondBr {
                        cond,
                        if_true,
                        if_false,
                    }
                }
            }
            "ret" => {
                if self.try_keyword("void") {
                    InstKind::Ret { value: None }
                } else {
                    let (_, value) = self.parse_typed_value()?;
                    InstKind::Ret { value: Some(value) }
                }
            }
            other => {
                if let Some(op) = BinaryOp::parse(other) {
                    while self.try_keyword("nuw") || self.try_keyword("nsw") || self.try_keyword("exact") {}
                    let (ty, lhs) = self.parse_typed_value()?;
                    self.expect(',')?;
                    let rhs = self.parse_value()?;
                    InstKind::Binary { op, ty, lhs, rhs }
                } else if let Some(op) = CastOp::parse(other) {
                    let (_, value) = self.parse_typed_value()?;
                    self.expect_keyword("to")?;
                    let to = self.parse_type()?;
                    InstKind::Cast { op, value, to }
                } else if other.is_empty() {
                    return Err(self.error(format!("expected an instruction, found '{}'", self.rest_of_line())));
                } else {
                    return Err(self.error(format!("unknown opcode '{other}'")));
                }
            }
        };

        let id = self.module.push_inst(Inst {
            name: name.map(str::to_string),
            kind,
            line: Some(line),
        });
        if let Some(name) = name {
            if self.locals.get(name) != Some(&id) {
                return Err(CompileError::Parse {
                    line,
                    message: format!("%{name} must be defined on its own line"),
                });
            }
        }
        self.finish_line()?;
        Ok(id)
    }
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '$' | '-')
}

/// The name at the start of `s`, up to the first non-name character.
fn leading_name(s: &str) -> &str {
    let end = s.find(|c: char| !is_name_char(c)).unwrap_or(s.len());
    &s[..end]
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}
