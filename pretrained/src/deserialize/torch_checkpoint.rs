use std::{
    cell::RefCell,
    io::{Cursor, Read},
    rc::Rc,
};

use log::debug;
use machine_learning::ParameterMapping;
use zip::{ZipArchive, result::ZipError};

use super::{ParamDeserializer, Precision, to_tensor};
use crate::error::{LoaderErr, Result};

type Archive<'b> = ZipArchive<Cursor<&'b [u8]>>;

/// Reads `torch.save` checkpoints of a state dict.
///
/// A checkpoint is a zip archive holding the pickled state dict under `<prefix>/data.pkl` and one
/// raw storage blob per tensor under `<prefix>/data/<key>`. Only the part of the pickle protocol
/// a state dict of dense floating point tensors is written with is understood. Entries keep the
/// order of the state dict.
#[derive(Debug, Default, Clone, Copy)]
pub struct TorchDeserializer;

impl ParamDeserializer for TorchDeserializer {
    fn deserialize(&self, bytes: &[u8]) -> Result<ParameterMapping> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_err)?;
        let prefix = archive_prefix(&archive)?;

        if let Some(order) = read_optional(&mut archive, &format!("{prefix}byteorder"))? {
            let order = String::from_utf8_lossy(&order);
            if order.trim() != "little" {
                return Err(corrupt(format!("unsupported byte order `{}`", order.trim())));
            }
        }

        let pickle = read(&mut archive, &format!("{prefix}data.pkl"))?;
        let entries = PickleMachine::new(&pickle).parse_state_dict()?;

        let params = entries
            .into_iter()
            .map(|(name, spec)| {
                let storage = read(&mut archive, &format!("{prefix}data/{}", spec.storage_key))?;
                let data = spec.slice(&name, &storage)?;
                let tensor = to_tensor(&name, spec.precision, &spec.shape, data)?;
                Ok((name, tensor))
            })
            .collect::<Result<ParameterMapping>>()?;

        debug!(tensors = params.len(), prefix = prefix.as_str(); "deserialized torch checkpoint");
        Ok(params)
    }
}

/// Finds the directory the checkpoint was saved under, `torch.save` names it after the file.
fn archive_prefix(archive: &Archive<'_>) -> Result<String> {
    archive
        .file_names()
        .filter_map(|name| name.strip_suffix("data.pkl"))
        .find(|prefix| prefix.is_empty() || prefix.ends_with('/'))
        .map(str::to_string)
        .ok_or_else(|| corrupt("no `data.pkl` in the checkpoint".into()))
}

fn read(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    read_optional(archive, name)?.ok_or_else(|| corrupt(format!("missing `{name}`")))
}

fn read_optional(archive: &mut Archive<'_>, name: &str) -> Result<Option<Vec<u8>>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(zip_err(e)),
    };

    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)
        .map_err(|e| corrupt(format!("`{name}`: {e}")))?;
    Ok(Some(buf))
}

fn corrupt(msg: String) -> LoaderErr {
    LoaderErr::CorruptArtifact(msg)
}

fn zip_err(e: ZipError) -> LoaderErr {
    corrupt(format!("not a torch checkpoint: {e}"))
}

fn pickle_err<S: Into<String>>(msg: S) -> LoaderErr {
    corrupt(format!("pickle: {}", msg.into()))
}

/// Where a tensor's elements live.
#[derive(Debug, Clone, PartialEq)]
struct TensorSpec {
    precision: Precision,
    shape: Vec<usize>,
    stride: Vec<usize>,
    storage_key: String,
    storage_offset: usize,
}

impl TensorSpec {
    /// Returns the bytes of this tensor within `storage`.
    fn slice<'s>(&self, name: &str, storage: &'s [u8]) -> Result<&'s [u8]> {
        if self.stride != contiguous_stride(&self.shape) {
            return Err(corrupt(format!(
                "`{name}` has strides {:?} for shape {:?}, only contiguous tensors are supported",
                self.stride, self.shape
            )));
        }

        let size = self.precision.size();
        let numel: usize = self.shape.iter().product();
        let range = self
            .storage_offset
            .checked_mul(size)
            .and_then(|begin| Some(begin..begin.checked_add(numel.checked_mul(size)?)?));

        range
            .and_then(|range| storage.get(range))
            .ok_or_else(|| {
                corrupt(format!(
                    "`{name}` does not fit in its {} byte storage",
                    storage.len()
                ))
            })
    }
}

fn contiguous_stride(shape: &[usize]) -> Vec<usize> {
    let mut stride = vec![0; shape.len()];
    let mut s = 1usize;
    for (i, &dim) in shape.iter().enumerate().rev() {
        stride[i] = s;
        s = s.saturating_mul(dim.max(1));
    }
    stride
}

#[derive(Debug, Clone)]
enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Tuple(Vec<Value>),
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    Global { module: String, name: String },
    Storage { precision: Precision, key: String },
    Tensor(TensorSpec),
    /// The outermost ordered dict, its entries are collected by the machine.
    StateDict,
}

/// Runs a pickle program, building the state dict's tensor specs in order.
struct PickleMachine<'a> {
    bytes: &'a [u8],
    pos: usize,
    stack: Vec<Value>,
    marks: Vec<usize>,
    memo: Vec<Option<Value>>,
    root_created: bool,
    entries: Vec<(String, TensorSpec)>,
}

impl<'a> PickleMachine<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: Vec::new(),
            root_created: false,
            entries: Vec::new(),
        }
    }

    fn parse_state_dict(mut self) -> Result<Vec<(String, TensorSpec)>> {
        loop {
            let op = self.read_u8()?;
            match op {
                // PROTO
                0x80 => {
                    self.read_u8()?;
                }
                // FRAME
                0x95 => {
                    self.take(8)?;
                }
                // GLOBAL
                b'c' => {
                    let module = self.read_line()?;
                    let name = self.read_line()?;
                    self.stack.push(Value::Global { module, name });
                }
                // STACK_GLOBAL
                0x93 => {
                    let name = self.pop_str()?;
                    let module = self.pop_str()?;
                    self.stack.push(Value::Global { module, name });
                }
                b'(' => self.marks.push(self.stack.len()),
                b')' => self.stack.push(Value::Tuple(Vec::new())),
                b'}' => self.stack.push(Value::Dict(Rc::default())),
                b'N' => self.stack.push(Value::None),
                0x88 => self.stack.push(Value::Bool(true)),
                0x89 => self.stack.push(Value::Bool(false)),
                // BINUNICODE
                b'X' => {
                    let len = u32::from_le_bytes(self.take_array()?) as usize;
                    let s = self.read_utf8(len)?;
                    self.stack.push(Value::Str(s));
                }
                // SHORT_BINUNICODE
                0x8c => {
                    let len = self.read_u8()? as usize;
                    let s = self.read_utf8(len)?;
                    self.stack.push(Value::Str(s));
                }
                // BININT1, BININT2, BININT
                b'K' => {
                    let v = self.read_u8()?;
                    self.stack.push(Value::Int(v.into()));
                }
                b'M' => {
                    let v = u16::from_le_bytes(self.take_array()?);
                    self.stack.push(Value::Int(v.into()));
                }
                b'J' => {
                    let v = i32::from_le_bytes(self.take_array()?);
                    self.stack.push(Value::Int(v.into()));
                }
                b't' => {
                    let items = self.pop_mark()?;
                    self.stack.push(Value::Tuple(items));
                }
                0x85..=0x87 => {
                    let n = (op - 0x84) as usize;
                    if self.stack.len() < n {
                        return Err(pickle_err("tuple longer than the stack"));
                    }
                    let items = self.stack.split_off(self.stack.len() - n);
                    self.stack.push(Value::Tuple(items));
                }
                // BINPUT, LONG_BINPUT, MEMOIZE
                b'q' => {
                    let idx = self.read_u8()? as usize;
                    self.memo_set(idx)?;
                }
                b'r' => {
                    let idx = u32::from_le_bytes(self.take_array()?) as usize;
                    self.memo_set(idx)?;
                }
                0x94 => self.memo_set(self.memo.len())?,
                // BINGET, LONG_BINGET
                b'h' => {
                    let idx = self.read_u8()? as usize;
                    let v = self.memo_get(idx)?;
                    self.stack.push(v);
                }
                b'j' => {
                    let idx = u32::from_le_bytes(self.take_array()?) as usize;
                    let v = self.memo_get(idx)?;
                    self.stack.push(v);
                }
                // BINPERSID
                b'Q' => {
                    let pid = self.pop()?;
                    let storage = persistent_load(pid)?;
                    self.stack.push(storage);
                }
                // REDUCE
                b'R' => {
                    let args = self.pop()?;
                    let callable = self.pop()?;
                    let value = self.reduce(callable, args)?;
                    self.stack.push(value);
                }
                // SETITEM
                b's' => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    self.set_item(key, value)?;
                }
                // SETITEMS
                b'u' => {
                    let items = self.pop_mark()?;
                    if items.len() % 2 != 0 {
                        return Err(pickle_err("SETITEMS with an odd amount of items"));
                    }
                    let mut items = items.into_iter();
                    while let (Some(key), Some(value)) = (items.next(), items.next()) {
                        self.set_item(key, value)?;
                    }
                }
                // BUILD, the state of a dict or tensor carries no parameters
                b'b' => {
                    self.pop()?;
                }
                // STOP
                b'.' => {
                    return match self.pop()? {
                        Value::StateDict => Ok(self.entries),
                        _ => Err(pickle_err("the checkpoint does not hold a state dict")),
                    };
                }
                other => {
                    return Err(pickle_err(format!(
                        "unsupported opcode 0x{other:02x} at {}",
                        self.pos - 1
                    )));
                }
            }
        }
    }

    fn set_item(&mut self, key: Value, value: Value) -> Result<()> {
        match self.stack.last() {
            Some(Value::StateDict) => {
                let (Value::Str(name), Value::Tensor(spec)) = (key, value) else {
                    return Err(pickle_err("state dict entries must map names to tensors"));
                };
                self.entries.push((name, spec));
                Ok(())
            }
            Some(Value::Dict(dict)) => {
                dict.borrow_mut().push((key, value));
                Ok(())
            }
            _ => Err(pickle_err("SETITEM on something other than a dict")),
        }
    }

    fn reduce(&mut self, callable: Value, args: Value) -> Result<Value> {
        let (Value::Global { module, name }, Value::Tuple(args)) = (callable, args) else {
            return Err(pickle_err("REDUCE expects a global and a tuple"));
        };

        match (module.as_str(), name.as_str()) {
            ("collections", "OrderedDict") if !self.root_created => {
                self.root_created = true;
                Ok(Value::StateDict)
            }
            ("collections", "OrderedDict") => Ok(Value::Dict(Rc::default())),
            // (storage, storage_offset, size, stride, requires_grad, backward_hooks[, metadata])
            ("torch._utils", "_rebuild_tensor_v2") => {
                if !(6..=7).contains(&args.len()) {
                    return Err(pickle_err(format!(
                        "_rebuild_tensor_v2 takes 6 or 7 arguments, got {}",
                        args.len()
                    )));
                }
                let Value::Storage { precision, key } = &args[0] else {
                    return Err(pickle_err("_rebuild_tensor_v2 expects a storage first"));
                };

                Ok(Value::Tensor(TensorSpec {
                    precision: *precision,
                    shape: usizes(&args[2])?,
                    stride: usizes(&args[3])?,
                    storage_key: key.clone(),
                    storage_offset: as_usize(&args[1])?,
                }))
            }
            _ => Err(pickle_err(format!("unsupported callable {module}.{name}"))),
        }
    }

    fn memo_set(&mut self, idx: usize) -> Result<()> {
        let v = self
            .stack
            .last()
            .cloned()
            .ok_or_else(|| pickle_err("memoizing an empty stack"))?;
        if self.memo.len() <= idx {
            self.memo.resize(idx + 1, None);
        }
        self.memo[idx] = Some(v);
        Ok(())
    }

    fn memo_get(&self, idx: usize) -> Result<Value> {
        self.memo
            .get(idx)
            .cloned()
            .flatten()
            .ok_or_else(|| pickle_err(format!("missing memo entry {idx}")))
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| pickle_err("unexpected empty stack"))
    }

    fn pop_str(&mut self) -> Result<String> {
        match self.pop()? {
            Value::Str(s) => Ok(s),
            _ => Err(pickle_err("expected a string")),
        }
    }

    fn pop_mark(&mut self) -> Result<Vec<Value>> {
        let mark = self
            .marks
            .pop()
            .filter(|&mark| mark <= self.stack.len())
            .ok_or_else(|| pickle_err("missing MARK"))?;
        Ok(self.stack.split_off(mark))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let all: &'a [u8] = self.bytes;
        let bytes = all
            .get(self.pos..self.pos.saturating_add(n))
            .ok_or_else(|| pickle_err("unexpected end of data"))?;
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.take(N)?
            .try_into()
            .map_err(|_| pickle_err("unexpected end of data"))
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_line(&mut self) -> Result<String> {
        let rest = &self.bytes[self.pos.min(self.bytes.len())..];
        let len = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| pickle_err("GLOBAL without a newline"))?;
        let line = self.read_utf8(len)?;
        self.pos += 1;
        Ok(line)
    }

    fn read_utf8(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| pickle_err(format!("invalid utf-8: {e}")))
    }
}

/// Resolves `('storage', torch.<Type>Storage, key, location, numel)`.
fn persistent_load(pid: Value) -> Result<Value> {
    let Value::Tuple(items) = pid else {
        return Err(pickle_err("persistent id must be a tuple"));
    };
    let [Value::Str(kind), Value::Global { module, name }, Value::Str(key), _, _] = &items[..]
    else {
        return Err(pickle_err("malformed persistent id"));
    };
    if kind != "storage" {
        return Err(pickle_err(format!("unsupported persistent id `{kind}`")));
    }

    let precision = match (module.as_str(), name.as_str()) {
        ("torch", "HalfStorage") => Precision::F16,
        ("torch", "BFloat16Storage") => Precision::BF16,
        ("torch", "FloatStorage") => Precision::F32,
        ("torch", "DoubleStorage") => Precision::F64,
        _ => {
            return Err(corrupt(format!(
                "storage {module}.{name} does not hold a floating point dtype"
            )));
        }
    };

    Ok(Value::Storage {
        precision,
        key: key.clone(),
    })
}

fn as_usize(v: &Value) -> Result<usize> {
    match v {
        Value::Int(i) => usize::try_from(*i).map_err(|_| pickle_err("negative size")),
        _ => Err(pickle_err("expected an integer")),
    }
}

fn usizes(v: &Value) -> Result<Vec<usize>> {
    match v {
        Value::Tuple(items) => items.iter().map(as_usize).collect(),
        _ => Err(pickle_err("expected a tuple of integers")),
    }
}
