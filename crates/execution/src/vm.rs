//! Stack-based bytecode interpreter over 256-bit words.
//!
//! Each call frame owns a state snapshot: `RETURN`/`STOP` commit the
//! frame's writes, `REVERT` and faults roll them back. Gas is charged per
//! opcode plus dynamic costs (memory expansion, copies, storage writes,
//! logs). Static frames reject every state-mutating opcode with
//! `StaticViolation`.

use crate::context::{BlockContext, TxContext};
use crate::error::VmError;
use crate::gas;
use crate::opcode as op;
use crate::precompiles;
use alloy_primitives::U256;
use sable_storage::StateStore;
use sable_types::{Address, AddressKind, Hash, Log};
use tracing::trace;

/// Stack depth limit per frame.
pub const MAX_STACK: usize = 1024;
/// Nested call depth limit.
pub const MAX_CALL_DEPTH: usize = 1024;
/// Memory offsets beyond this are unpayable anyway; treated as out of gas.
const MAX_MEM_OFFSET: u64 = u32::MAX as u64;

/// How a frame ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// STOP, RETURN or implicit end of code; state changes committed.
    Success,
    /// Explicit REVERT; state changes undone, unused gas preserved.
    Revert,
    /// A fault; state changes undone, all frame gas consumed.
    Fault(VmError),
}

/// Result of one call or create frame.
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub outcome: FrameOutcome,
    pub gas_left: u64,
    pub output: Vec<u8>,
    pub logs: Vec<Log>,
}

impl FrameResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FrameOutcome::Success)
    }

    fn fault(err: VmError) -> Self {
        Self {
            outcome: FrameOutcome::Fault(err),
            gas_left: 0,
            output: Vec::new(),
            logs: Vec::new(),
        }
    }

    fn success(gas_left: u64, output: Vec<u8>, logs: Vec<Log>) -> Self {
        Self {
            outcome: FrameOutcome::Success,
            gas_left,
            output,
            logs,
        }
    }
}

/// The virtual machine: drives frames against a state store within one
/// transaction.
pub struct Vm<'a> {
    state: &'a mut StateStore,
    block: &'a BlockContext,
    tx: TxContext,
    depth: usize,
}

impl<'a> Vm<'a> {
    pub fn new(state: &'a mut StateStore, block: &'a BlockContext, tx: TxContext) -> Self {
        Self {
            state,
            block,
            tx,
            depth: 0,
        }
    }

    /// Call `to` with a value transfer. Handles precompile dispatch, plain
    /// transfers (empty code) and contract execution. On any failure the
    /// frame's state changes are rolled back.
    pub fn call(
        &mut self,
        caller: Address,
        to: Address,
        value: u64,
        input: &[u8],
        gas: u64,
        is_static: bool,
    ) -> FrameResult {
        if self.depth >= MAX_CALL_DEPTH {
            // Too deep: the call fails without burning the forwarded gas.
            return FrameResult {
                outcome: FrameOutcome::Revert,
                gas_left: gas,
                output: Vec::new(),
                logs: Vec::new(),
            };
        }

        let snap = self.state.snapshot();
        self.depth += 1;

        let result = self.call_inner(caller, to, value, input, gas, is_static);

        self.depth -= 1;
        if !result.is_success() {
            self.state.revert(snap);
        }
        result
    }

    fn call_inner(
        &mut self,
        caller: Address,
        to: Address,
        value: u64,
        input: &[u8],
        gas: u64,
        is_static: bool,
    ) -> FrameResult {
        if value > 0 {
            if is_static {
                return FrameResult::fault(VmError::StaticViolation);
            }
            if self.state.sub_balance(&caller, value).is_err() {
                return FrameResult::fault(VmError::BalanceUnderflow);
            }
            self.state.add_balance(&to, value);
        }

        if let Some(id) = precompiles::lookup(&to) {
            return match precompiles::execute(id, input, gas) {
                Ok(out) => FrameResult::success(gas - out.gas_used, out.data, Vec::new()),
                Err(err) => FrameResult::fault(err),
            };
        }

        let code = match self.state.get_code(&to) {
            Ok(code) => code,
            Err(err) => return FrameResult::fault(VmError::Storage(err.to_string())),
        };
        if code.is_empty() {
            return FrameResult::success(gas, Vec::new(), Vec::new());
        }

        self.execute_frame(to, caller, value, code, input.to_vec(), gas, is_static)
    }

    /// Execute `code_source`'s code in the storage context of
    /// `context_addr` (DELEGATECALL / CALLCODE). No value is moved.
    fn call_with_code_of(
        &mut self,
        context_addr: Address,
        caller: Address,
        value: u64,
        code_source: Address,
        input: &[u8],
        gas: u64,
        is_static: bool,
    ) -> FrameResult {
        if self.depth >= MAX_CALL_DEPTH {
            return FrameResult {
                outcome: FrameOutcome::Revert,
                gas_left: gas,
                output: Vec::new(),
                logs: Vec::new(),
            };
        }

        if let Some(id) = precompiles::lookup(&code_source) {
            return match precompiles::execute(id, input, gas) {
                Ok(out) => FrameResult::success(gas - out.gas_used, out.data, Vec::new()),
                Err(err) => FrameResult::fault(err),
            };
        }

        let code = match self.state.get_code(&code_source) {
            Ok(code) => code,
            Err(err) => return FrameResult::fault(VmError::Storage(err.to_string())),
        };
        if code.is_empty() {
            return FrameResult::success(gas, Vec::new(), Vec::new());
        }

        let snap = self.state.snapshot();
        self.depth += 1;
        let result =
            self.execute_frame(context_addr, caller, value, code, input.to_vec(), gas, is_static);
        self.depth -= 1;
        if !result.is_success() {
            self.state.revert(snap);
        }
        result
    }

    /// Create a contract. The new address derives from the creator's
    /// current account nonce (or the salt for CREATE2), truncated to the
    /// 28-byte payload and tagged `Script`.
    pub fn create(
        &mut self,
        creator: Address,
        init_code: &[u8],
        value: u64,
        gas: u64,
        salt: Option<U256>,
    ) -> (FrameResult, Option<Address>) {
        if self.depth >= MAX_CALL_DEPTH {
            return (
                FrameResult {
                    outcome: FrameOutcome::Revert,
                    gas_left: gas,
                    output: Vec::new(),
                    logs: Vec::new(),
                },
                None,
            );
        }

        let new_addr = match salt {
            None => {
                let nonce = self.state.get_nonce(&creator);
                let digest = Hash::compute_all(&[creator.as_bytes(), &nonce.to_be_bytes()]);
                Address::script_from_digest(&digest)
            }
            Some(salt) => {
                let init_hash = Hash::compute(init_code);
                let digest = Hash::compute_all(&[
                    creator.as_bytes(),
                    &salt.to_be_bytes::<32>(),
                    &init_hash.0,
                ]);
                Address::script_from_digest(&digest)
            }
        };

        let snap = self.state.snapshot();
        self.depth += 1;

        let mut result = (|| {
            if value > 0 {
                if self.state.sub_balance(&creator, value).is_err() {
                    return FrameResult::fault(VmError::BalanceUnderflow);
                }
                self.state.add_balance(&new_addr, value);
            }
            self.execute_frame(
                new_addr,
                creator,
                value,
                init_code.to_vec(),
                Vec::new(),
                gas,
                false,
            )
        })();

        self.depth -= 1;

        if result.is_success() {
            // The init code's return data becomes the deployed bytecode.
            let deployed = std::mem::take(&mut result.output);
            self.state.set_code(&new_addr, deployed);
            trace!(address = %new_addr, "contract created");
            (result, Some(new_addr))
        } else {
            self.state.revert(snap);
            (result, None)
        }
    }

    fn execute_frame(
        &mut self,
        address: Address,
        caller: Address,
        value: u64,
        code: Vec<u8>,
        input: Vec<u8>,
        gas: u64,
        is_static: bool,
    ) -> FrameResult {
        let mut machine = Machine::new(self, address, caller, value, code, input, gas, is_static);
        match machine.run() {
            Ok(output) => {
                let logs = std::mem::take(&mut machine.logs);
                FrameResult::success(machine.gas, output, logs)
            }
            Err(VmError::Revert(data)) => FrameResult {
                outcome: FrameOutcome::Revert,
                gas_left: machine.gas,
                output: data,
                logs: Vec::new(),
            },
            Err(err) => FrameResult::fault(err),
        }
    }
}

/// One frame's registers plus a borrow of the VM for state and sub-calls.
struct Machine<'m, 'a> {
    vm: &'m mut Vm<'a>,
    address: Address,
    caller: Address,
    value: u64,
    code: Vec<u8>,
    input: Vec<u8>,
    is_static: bool,
    stack: Vec<U256>,
    memory: Vec<u8>,
    pc: usize,
    gas: u64,
    return_buffer: Vec<u8>,
    logs: Vec<Log>,
    jumpdests: Vec<bool>,
}

impl<'m, 'a> Machine<'m, 'a> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        vm: &'m mut Vm<'a>,
        address: Address,
        caller: Address,
        value: u64,
        code: Vec<u8>,
        input: Vec<u8>,
        gas: u64,
        is_static: bool,
    ) -> Self {
        let jumpdests = analyze_jumpdests(&code);
        Self {
            vm,
            address,
            caller,
            value,
            code,
            input,
            is_static,
            stack: Vec::with_capacity(64),
            memory: Vec::new(),
            pc: 0,
            gas,
            return_buffer: Vec::new(),
            logs: Vec::new(),
            jumpdests,
        }
    }

    fn charge(&mut self, amount: u64) -> Result<(), VmError> {
        if self.gas < amount {
            self.gas = 0;
            return Err(VmError::OutOfGas);
        }
        self.gas -= amount;
        Ok(())
    }

    fn push(&mut self, word: U256) -> Result<(), VmError> {
        if self.stack.len() >= MAX_STACK {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(word);
        Ok(())
    }

    fn pop(&mut self) -> Result<U256, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Expand memory to cover `[offset, offset+len)`, charging expansion.
    fn expand_memory(&mut self, offset: U256, len: U256) -> Result<(usize, usize), VmError> {
        let len_u = to_mem_size(len)?;
        if len_u == 0 {
            return Ok((0, 0));
        }
        let offset_u = to_mem_size(offset)?;
        let end = offset_u
            .checked_add(len_u)
            .ok_or(VmError::OutOfGas)
            .and_then(|end| {
                if end as u64 > MAX_MEM_OFFSET {
                    Err(VmError::OutOfGas)
                } else {
                    Ok(end)
                }
            })?;

        let current_words = (self.memory.len() as u64).div_ceil(32);
        let new_words = (end as u64).div_ceil(32);
        let cost = gas::memory_expansion_cost(current_words, new_words);
        self.charge(cost)?;
        if new_words > current_words {
            self.memory.resize((new_words * 32) as usize, 0);
        }
        Ok((offset_u, len_u))
    }

    fn read_memory(&mut self, offset: U256, len: U256) -> Result<Vec<u8>, VmError> {
        let (off, len) = self.expand_memory(offset, len)?;
        Ok(self.memory[off..off + len].to_vec())
    }

    /// Copy `src` into memory at `dest`, zero-filling past the source end.
    fn copy_to_memory(
        &mut self,
        dest: U256,
        src_offset: U256,
        len: U256,
        src: &[u8],
    ) -> Result<(), VmError> {
        let (dest_u, len_u) = self.expand_memory(dest, len)?;
        if len_u == 0 {
            return Ok(());
        }
        self.charge(gas::copy_cost(len_u as u64))?;
        let src_off = to_mem_size(src_offset).unwrap_or(usize::MAX);
        for i in 0..len_u {
            self.memory[dest_u + i] = src_off
                .checked_add(i)
                .and_then(|pos| src.get(pos))
                .copied()
                .unwrap_or(0);
        }
        Ok(())
    }

    fn run(&mut self) -> Result<Vec<u8>, VmError> {
        loop {
            let Some(&opcode) = self.code.get(self.pc) else {
                // Running off the end of code is an implicit STOP.
                return Ok(Vec::new());
            };

            match opcode {
                op::STOP => return Ok(Vec::new()),

                // ---- arithmetic ----
                op::ADD => {
                    self.charge(gas::VERYLOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(a.wrapping_add(b))?;
                }
                op::MUL => {
                    self.charge(gas::LOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(a.wrapping_mul(b))?;
                }
                op::SUB => {
                    self.charge(gas::VERYLOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(a.wrapping_sub(b))?;
                }
                op::DIV => {
                    self.charge(gas::LOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(a.checked_div(b).unwrap_or(U256::ZERO))?;
                }
                op::SDIV => {
                    self.charge(gas::LOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(sdiv(a, b))?;
                }
                op::MOD => {
                    self.charge(gas::LOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(a.checked_rem(b).unwrap_or(U256::ZERO))?;
                }
                op::SMOD => {
                    self.charge(gas::LOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(smod(a, b))?;
                }
                op::ADDMOD => {
                    self.charge(gas::MID)?;
                    let (a, b, n) = (self.pop()?, self.pop()?, self.pop()?);
                    let r = if n.is_zero() { U256::ZERO } else { a.add_mod(b, n) };
                    self.push(r)?;
                }
                op::MULMOD => {
                    self.charge(gas::MID)?;
                    let (a, b, n) = (self.pop()?, self.pop()?, self.pop()?);
                    let r = if n.is_zero() { U256::ZERO } else { a.mul_mod(b, n) };
                    self.push(r)?;
                }
                op::EXP => {
                    let (base, exponent) = (self.pop()?, self.pop()?);
                    let exp_bytes = (exponent.bit_len() as u64).div_ceil(8);
                    self.charge(gas::exp_cost(exp_bytes))?;
                    self.push(wrapping_exp(base, exponent))?;
                }

                // ---- compare / logic ----
                op::LT => {
                    self.charge(gas::VERYLOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(bool_word(a < b))?;
                }
                op::GT => {
                    self.charge(gas::VERYLOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(bool_word(a > b))?;
                }
                op::SLT => {
                    self.charge(gas::VERYLOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(bool_word(signed_lt(a, b)))?;
                }
                op::SGT => {
                    self.charge(gas::VERYLOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(bool_word(signed_lt(b, a)))?;
                }
                op::EQ => {
                    self.charge(gas::VERYLOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(bool_word(a == b))?;
                }
                op::ISZERO => {
                    self.charge(gas::VERYLOW)?;
                    let a = self.pop()?;
                    self.push(bool_word(a.is_zero()))?;
                }
                op::AND => {
                    self.charge(gas::VERYLOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(a & b)?;
                }
                op::OR => {
                    self.charge(gas::VERYLOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(a | b)?;
                }
                op::XOR => {
                    self.charge(gas::VERYLOW)?;
                    let (a, b) = (self.pop()?, self.pop()?);
                    self.push(a ^ b)?;
                }
                op::NOT => {
                    self.charge(gas::VERYLOW)?;
                    let a = self.pop()?;
                    self.push(!a)?;
                }
                op::BYTE => {
                    self.charge(gas::VERYLOW)?;
                    let (i, x) = (self.pop()?, self.pop()?);
                    let r = if i < U256::from(32u8) {
                        let idx = i.to::<u64>() as usize;
                        U256::from(x.to_be_bytes::<32>()[idx])
                    } else {
                        U256::ZERO
                    };
                    self.push(r)?;
                }
                op::SHL => {
                    self.charge(gas::VERYLOW)?;
                    let (shift, val) = (self.pop()?, self.pop()?);
                    let r = if shift >= U256::from(256u16) {
                        U256::ZERO
                    } else {
                        val << shift.to::<u64>() as usize
                    };
                    self.push(r)?;
                }
                op::SHR => {
                    self.charge(gas::VERYLOW)?;
                    let (shift, val) = (self.pop()?, self.pop()?);
                    let r = if shift >= U256::from(256u16) {
                        U256::ZERO
                    } else {
                        val >> shift.to::<u64>() as usize
                    };
                    self.push(r)?;
                }
                op::SAR => {
                    self.charge(gas::VERYLOW)?;
                    let (shift, val) = (self.pop()?, self.pop()?);
                    self.push(sar(shift, val))?;
                }

                op::SHA3 => {
                    let (offset, len) = (self.pop()?, self.pop()?);
                    let data = self.read_memory(offset, len)?;
                    self.charge(gas::sha3_cost(data.len() as u64))?;
                    self.push(word_from_hash(&Hash::compute(&data)))?;
                }

                // ---- environment ----
                op::ADDRESS => {
                    self.charge(gas::BASE)?;
                    let w = word_from_address(&self.address);
                    self.push(w)?;
                }
                op::BALANCE => {
                    self.charge(gas::BALANCE)?;
                    let addr = address_from_word(self.pop()?);
                    let bal = self.vm.state.get_balance(&addr);
                    self.push(U256::from(bal))?;
                }
                op::ORIGIN => {
                    self.charge(gas::BASE)?;
                    let w = word_from_address(&self.vm.tx.origin);
                    self.push(w)?;
                }
                op::CALLER => {
                    self.charge(gas::BASE)?;
                    let w = word_from_address(&self.caller);
                    self.push(w)?;
                }
                op::CALLVALUE => {
                    self.charge(gas::BASE)?;
                    let v = self.value;
                    self.push(U256::from(v))?;
                }
                op::CALLDATALOAD => {
                    self.charge(gas::VERYLOW)?;
                    let offset = self.pop()?;
                    let mut word = [0u8; 32];
                    if let Ok(off) = to_mem_size(offset) {
                        for (i, byte) in word.iter_mut().enumerate() {
                            *byte = self.input.get(off + i).copied().unwrap_or(0);
                        }
                    }
                    self.push(U256::from_be_bytes(word))?;
                }
                op::CALLDATASIZE => {
                    self.charge(gas::BASE)?;
                    let len = self.input.len();
                    self.push(U256::from(len))?;
                }
                op::CALLDATACOPY => {
                    self.charge(gas::VERYLOW)?;
                    let (dest, offset, len) = (self.pop()?, self.pop()?, self.pop()?);
                    let input = std::mem::take(&mut self.input);
                    let res = self.copy_to_memory(dest, offset, len, &input);
                    self.input = input;
                    res?;
                }
                op::CODESIZE => {
                    self.charge(gas::BASE)?;
                    let len = self.code.len();
                    self.push(U256::from(len))?;
                }
                op::CODECOPY => {
                    self.charge(gas::VERYLOW)?;
                    let (dest, offset, len) = (self.pop()?, self.pop()?, self.pop()?);
                    let code = std::mem::take(&mut self.code);
                    let res = self.copy_to_memory(dest, offset, len, &code);
                    self.code = code;
                    res?;
                }
                op::GASPRICE => {
                    self.charge(gas::BASE)?;
                    let p = self.vm.tx.gas_price;
                    self.push(U256::from(p))?;
                }
                op::EXTCODESIZE => {
                    self.charge(gas::EXTCODE)?;
                    let addr = address_from_word(self.pop()?);
                    let code = self
                        .vm
                        .state
                        .get_code(&addr)
                        .map_err(|e| VmError::Storage(e.to_string()))?;
                    self.push(U256::from(code.len()))?;
                }
                op::RETURNDATASIZE => {
                    self.charge(gas::BASE)?;
                    let len = self.return_buffer.len();
                    self.push(U256::from(len))?;
                }
                op::RETURNDATACOPY => {
                    self.charge(gas::VERYLOW)?;
                    let (dest, offset, len) = (self.pop()?, self.pop()?, self.pop()?);
                    let buffer = std::mem::take(&mut self.return_buffer);
                    let res = self.copy_to_memory(dest, offset, len, &buffer);
                    self.return_buffer = buffer;
                    res?;
                }

                // ---- block context ----
                op::BLOCKHASH => {
                    self.charge(gas::BASE)?;
                    let n = self.pop()?;
                    let current = self.vm.block.block_number;
                    let r = if current > 0 && n == U256::from(current - 1) {
                        word_from_hash(&self.vm.block.parent_hash)
                    } else {
                        U256::ZERO
                    };
                    self.push(r)?;
                }
                op::COINBASE => {
                    self.charge(gas::BASE)?;
                    let w = word_from_address(&self.vm.block.coinbase);
                    self.push(w)?;
                }
                op::TIMESTAMP => {
                    self.charge(gas::BASE)?;
                    let t = self.vm.block.timestamp;
                    self.push(U256::from(t))?;
                }
                op::NUMBER => {
                    self.charge(gas::BASE)?;
                    let n = self.vm.block.block_number;
                    self.push(U256::from(n))?;
                }
                op::PREVRANDAO => {
                    // No randomness beacon on this chain; always zero.
                    self.charge(gas::BASE)?;
                    self.push(U256::ZERO)?;
                }
                op::GASLIMIT => {
                    self.charge(gas::BASE)?;
                    let l = self.vm.block.gas_limit;
                    self.push(U256::from(l))?;
                }
                op::CHAINID => {
                    self.charge(gas::BASE)?;
                    let id = self.vm.block.chain_id;
                    self.push(U256::from(id))?;
                }
                op::SELFBALANCE => {
                    self.charge(gas::LOW)?;
                    let bal = self.vm.state.get_balance(&self.address);
                    self.push(U256::from(bal))?;
                }
                op::BASEFEE => {
                    self.charge(gas::BASE)?;
                    let f = self.vm.block.base_fee;
                    self.push(U256::from(f))?;
                }

                // ---- stack / memory / flow ----
                op::POP => {
                    self.charge(gas::BASE)?;
                    self.pop()?;
                }
                op::MLOAD => {
                    self.charge(gas::VERYLOW)?;
                    let offset = self.pop()?;
                    let bytes = self.read_memory(offset, U256::from(32u8))?;
                    self.push(U256::from_be_bytes::<32>(
                        bytes.try_into().expect("32 bytes"),
                    ))?;
                }
                op::MSTORE => {
                    self.charge(gas::VERYLOW)?;
                    let (offset, val) = (self.pop()?, self.pop()?);
                    let (off, _) = self.expand_memory(offset, U256::from(32u8))?;
                    self.memory[off..off + 32].copy_from_slice(&val.to_be_bytes::<32>());
                }
                op::SLOAD => {
                    self.charge(gas::SLOAD)?;
                    let slot = hash_from_word(self.pop()?);
                    let value = self.vm.state.get_storage(&self.address, &slot);
                    self.push(word_from_storage_value(&value))?;
                }
                op::SSTORE => {
                    if self.is_static {
                        return Err(VmError::StaticViolation);
                    }
                    let slot = hash_from_word(self.pop()?);
                    let value = self.pop()?;
                    let current = self.vm.state.get_storage(&self.address, &slot);
                    let cost = if current.is_empty() && !value.is_zero() {
                        gas::SSTORE_SET
                    } else {
                        gas::SSTORE_RESET
                    };
                    self.charge(cost)?;
                    let stored = if value.is_zero() {
                        Vec::new()
                    } else {
                        value.to_be_bytes::<32>().to_vec()
                    };
                    self.vm.state.set_storage(&self.address, &slot, stored);
                }
                op::JUMP => {
                    self.charge(gas::MID)?;
                    let dest = self.pop()?;
                    self.pc = self.jump_target(dest)?;
                    continue;
                }
                op::JUMPI => {
                    self.charge(gas::HIGH)?;
                    let (dest, cond) = (self.pop()?, self.pop()?);
                    if !cond.is_zero() {
                        self.pc = self.jump_target(dest)?;
                        continue;
                    }
                }
                op::PC => {
                    self.charge(gas::BASE)?;
                    let pc = self.pc;
                    self.push(U256::from(pc))?;
                }
                op::MSIZE => {
                    self.charge(gas::BASE)?;
                    let len = self.memory.len();
                    self.push(U256::from(len))?;
                }
                op::GAS => {
                    self.charge(gas::BASE)?;
                    let g = self.gas;
                    self.push(U256::from(g))?;
                }
                op::JUMPDEST => {
                    self.charge(gas::JUMPDEST)?;
                }

                _ if op::is_push(opcode) => {
                    self.charge(gas::VERYLOW)?;
                    let n = op::push_size(opcode);
                    let mut word = [0u8; 32];
                    for i in 0..n {
                        word[32 - n + i] = self.code.get(self.pc + 1 + i).copied().unwrap_or(0);
                    }
                    self.push(U256::from_be_bytes(word))?;
                    self.pc += n;
                }
                _ if (op::DUP1..=op::DUP16).contains(&opcode) => {
                    self.charge(gas::VERYLOW)?;
                    let n = (opcode - op::DUP1 + 1) as usize;
                    if self.stack.len() < n {
                        return Err(VmError::StackUnderflow);
                    }
                    let word = self.stack[self.stack.len() - n];
                    self.push(word)?;
                }
                _ if (op::SWAP1..=op::SWAP16).contains(&opcode) => {
                    self.charge(gas::VERYLOW)?;
                    let n = (opcode - op::SWAP1 + 1) as usize;
                    if self.stack.len() < n + 1 {
                        return Err(VmError::StackUnderflow);
                    }
                    let top = self.stack.len() - 1;
                    self.stack.swap(top, top - n);
                }

                // ---- logging ----
                _ if (op::LOG0..=op::LOG4).contains(&opcode) => {
                    if self.is_static {
                        return Err(VmError::StaticViolation);
                    }
                    let topic_count = (opcode - op::LOG0) as usize;
                    let (offset, len) = (self.pop()?, self.pop()?);
                    let mut topics = Vec::with_capacity(topic_count);
                    for _ in 0..topic_count {
                        topics.push(hash_from_word(self.pop()?));
                    }
                    let data = self.read_memory(offset, len)?;
                    self.charge(gas::log_cost(topic_count as u64, data.len() as u64))?;
                    self.logs.push(Log {
                        address: self.address,
                        topics,
                        data,
                    });
                }

                // ---- system ----
                op::CREATE | op::CREATE2 => {
                    if self.is_static {
                        return Err(VmError::StaticViolation);
                    }
                    self.charge(gas::CREATE)?;
                    let value = self.pop()?;
                    let (offset, len) = (self.pop()?, self.pop()?);
                    let salt = if opcode == op::CREATE2 {
                        Some(self.pop()?)
                    } else {
                        None
                    };
                    let init_code = self.read_memory(offset, len)?;
                    let value = to_u64_value(value)?;

                    // The creator's nonce advances even if the create
                    // fails; it is undone only if this frame reverts.
                    let creator = self.address;
                    self.vm.state.increment_nonce(&creator);

                    let forwarded = self.gas;
                    let (result, created) =
                        self.vm.create(creator, &init_code, value, forwarded, salt);
                    self.gas = result.gas_left;
                    self.return_buffer = if result.is_success() {
                        Vec::new()
                    } else {
                        result.output.clone()
                    };
                    self.logs.extend(result.logs);
                    match created {
                        Some(addr) => self.push(word_from_address(&addr))?,
                        None => self.push(U256::ZERO)?,
                    }
                }
                op::CALL | op::CALLCODE => {
                    let requested = self.pop()?;
                    let to = address_from_word(self.pop()?);
                    let value = to_u64_value(self.pop()?)?;
                    let (in_off, in_len) = (self.pop()?, self.pop()?);
                    let (out_off, out_len) = (self.pop()?, self.pop()?);

                    if value > 0 && self.is_static && opcode == op::CALL {
                        return Err(VmError::StaticViolation);
                    }

                    let mut cost = gas::CALL;
                    if value > 0 {
                        cost += gas::CALL_VALUE;
                        if opcode == op::CALL
                            && self.vm.state.get_account(&to).is_empty()
                            && precompiles::lookup(&to).is_none()
                        {
                            cost += gas::CALL_NEW_ACCOUNT;
                        }
                    }
                    self.charge(cost)?;

                    let args = self.read_memory(in_off, in_len)?;
                    let forwarded = min_gas(requested, self.gas);
                    self.gas -= forwarded;

                    let result = if opcode == op::CALL {
                        let caller = self.address;
                        let is_static = self.is_static;
                        self.vm.call(caller, to, value, &args, forwarded, is_static)
                    } else {
                        // CALLCODE: target code runs against our own
                        // storage; we are both caller and context.
                        let ctx = self.address;
                        let is_static = self.is_static;
                        self.vm
                            .call_with_code_of(ctx, ctx, value, to, &args, forwarded, is_static)
                    };

                    self.finish_subcall(result, out_off, out_len)?;
                }
                op::DELEGATECALL | op::STATICCALL => {
                    let requested = self.pop()?;
                    let to = address_from_word(self.pop()?);
                    let (in_off, in_len) = (self.pop()?, self.pop()?);
                    let (out_off, out_len) = (self.pop()?, self.pop()?);

                    self.charge(gas::CALL)?;
                    let args = self.read_memory(in_off, in_len)?;
                    let forwarded = min_gas(requested, self.gas);
                    self.gas -= forwarded;

                    let result = if opcode == op::DELEGATECALL {
                        // Keep caller and value from this frame.
                        let ctx = self.address;
                        let caller = self.caller;
                        let value = self.value;
                        let is_static = self.is_static;
                        self.vm
                            .call_with_code_of(ctx, caller, value, to, &args, forwarded, is_static)
                    } else {
                        let caller = self.address;
                        self.vm.call(caller, to, 0, &args, forwarded, true)
                    };

                    self.finish_subcall(result, out_off, out_len)?;
                }
                op::RETURN => {
                    let (offset, len) = (self.pop()?, self.pop()?);
                    let data = self.read_memory(offset, len)?;
                    return Ok(data);
                }
                op::REVERT => {
                    let (offset, len) = (self.pop()?, self.pop()?);
                    let data = self.read_memory(offset, len)?;
                    return Err(VmError::Revert(data));
                }
                op::INVALID => return Err(VmError::InvalidOpcode(op::INVALID)),
                op::SELFDESTRUCT => {
                    if self.is_static {
                        return Err(VmError::StaticViolation);
                    }
                    self.charge(gas::SELFDESTRUCT)?;
                    let beneficiary = address_from_word(self.pop()?);
                    let balance = self.vm.state.get_balance(&self.address);
                    if balance > 0 && beneficiary.payload != self.address.payload {
                        self.vm.state.add_balance(&beneficiary, balance);
                    }
                    self.vm.state.delete_account(&self.address);
                    return Ok(Vec::new());
                }

                other => return Err(VmError::InvalidOpcode(other)),
            }

            self.pc += 1;
        }
    }

    /// Merge a sub-call result: restore gas, write the output window, set
    /// the return buffer, push the success flag.
    fn finish_subcall(
        &mut self,
        result: FrameResult,
        out_off: U256,
        out_len: U256,
    ) -> Result<(), VmError> {
        self.gas += result.gas_left;
        self.return_buffer = result.output.clone();

        if !result.output.is_empty() && !out_len.is_zero() {
            let output = result.output.clone();
            self.copy_to_memory(out_off, U256::ZERO, min_u256(out_len, output.len()), &output)?;
        }

        let ok = result.is_success();
        if ok {
            self.logs.extend(result.logs);
        }
        self.push(bool_word(ok))
    }

    fn jump_target(&self, dest: U256) -> Result<usize, VmError> {
        let target = to_mem_size(dest).map_err(|_| VmError::BadJump(usize::MAX))?;
        if self.jumpdests.get(target).copied().unwrap_or(false) {
            Ok(target)
        } else {
            Err(VmError::BadJump(target))
        }
    }
}

/// Mark every JUMPDEST byte that is not inside PUSH immediate data.
fn analyze_jumpdests(code: &[u8]) -> Vec<bool> {
    let mut dests = vec![false; code.len()];
    let mut i = 0;
    while i < code.len() {
        let byte = code[i];
        if byte == op::JUMPDEST {
            dests[i] = true;
        }
        i += 1 + if op::is_push(byte) { op::push_size(byte) } else { 0 };
    }
    dests
}

// ---- word conversions ----

fn bool_word(b: bool) -> U256 {
    if b {
        U256::from(1u8)
    } else {
        U256::ZERO
    }
}

/// Address as a word: payload right-aligned in the low 28 bytes.
pub fn word_from_address(addr: &Address) -> U256 {
    let mut bytes = [0u8; 32];
    bytes[4..].copy_from_slice(addr.as_bytes());
    U256::from_be_bytes(bytes)
}

/// Low 28 bytes of the word as an address payload.
pub fn address_from_word(word: U256) -> Address {
    let bytes = word.to_be_bytes::<32>();
    let mut payload = [0u8; 28];
    payload.copy_from_slice(&bytes[4..]);
    Address::new(AddressKind::PaymentOnly, payload)
}

fn word_from_hash(hash: &Hash) -> U256 {
    U256::from_be_bytes(hash.0)
}

fn hash_from_word(word: U256) -> Hash {
    Hash(word.to_be_bytes::<32>())
}

/// Storage values are canonically 32 bytes; shorter values load
/// left-aligned, absent values load as zero.
fn word_from_storage_value(value: &[u8]) -> U256 {
    let mut bytes = [0u8; 32];
    let len = value.len().min(32);
    bytes[..len].copy_from_slice(&value[..len]);
    U256::from_be_bytes(bytes)
}

fn to_mem_size(word: U256) -> Result<usize, VmError> {
    if word > U256::from(MAX_MEM_OFFSET) {
        return Err(VmError::OutOfGas);
    }
    Ok(word.to::<u64>() as usize)
}

/// Transferred values are u64 on this chain; a larger word cannot be
/// covered by any balance.
fn to_u64_value(word: U256) -> Result<u64, VmError> {
    if word > U256::from(u64::MAX) {
        return Err(VmError::BalanceUnderflow);
    }
    Ok(word.to::<u64>())
}

fn min_gas(requested: U256, available: u64) -> u64 {
    if requested >= U256::from(available) {
        available
    } else {
        requested.to::<u64>()
    }
}

fn min_u256(a: U256, b: usize) -> U256 {
    let b = U256::from(b);
    if a < b {
        a
    } else {
        b
    }
}

// ---- signed 256-bit helpers ----

fn is_negative(x: U256) -> bool {
    x.bit(255)
}

fn negate(x: U256) -> U256 {
    (!x).wrapping_add(U256::from(1u8))
}

fn signed_lt(a: U256, b: U256) -> bool {
    match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let (neg_a, neg_b) = (is_negative(a), is_negative(b));
    let abs_a = if neg_a { negate(a) } else { a };
    let abs_b = if neg_b { negate(b) } else { b };
    let q = abs_a.checked_div(abs_b).unwrap_or(U256::ZERO);
    if neg_a != neg_b {
        negate(q)
    } else {
        q
    }
}

fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let neg_a = is_negative(a);
    let abs_a = if neg_a { negate(a) } else { a };
    let abs_b = if is_negative(b) { negate(b) } else { b };
    let r = abs_a.checked_rem(abs_b).unwrap_or(U256::ZERO);
    // The result takes the sign of the dividend.
    if neg_a {
        negate(r)
    } else {
        r
    }
}

fn sar(shift: U256, value: U256) -> U256 {
    let neg = is_negative(value);
    if shift >= U256::from(256u16) {
        return if neg { !U256::ZERO } else { U256::ZERO };
    }
    let s = shift.to::<u64>() as usize;
    let shifted = value >> s;
    if neg && s > 0 {
        // Fill the vacated high bits with ones.
        let fill = !(!U256::ZERO >> s);
        shifted | fill
    } else {
        shifted
    }
}

fn wrapping_exp(base: U256, mut exponent: U256) -> U256 {
    let mut result = U256::from(1u8);
    let mut acc = base;
    while !exponent.is_zero() {
        if exponent.bit(0) {
            result = result.wrapping_mul(acc);
        }
        acc = acc.wrapping_mul(acc);
        exponent >>= 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_division_truncates_toward_zero() {
        let minus_seven = negate(U256::from(7u8));
        let two = U256::from(2u8);
        assert_eq!(sdiv(minus_seven, two), negate(U256::from(3u8)));
        assert_eq!(smod(minus_seven, two), negate(U256::from(1u8)));
        assert_eq!(sdiv(U256::from(7u8), two), U256::from(3u8));
    }

    #[test]
    fn division_by_zero_yields_zero() {
        assert_eq!(sdiv(U256::from(5u8), U256::ZERO), U256::ZERO);
        assert_eq!(smod(U256::from(5u8), U256::ZERO), U256::ZERO);
    }

    #[test]
    fn sar_sign_extends() {
        let minus_eight = negate(U256::from(8u8));
        assert_eq!(sar(U256::from(1u8), minus_eight), negate(U256::from(4u8)));
        assert_eq!(sar(U256::from(1u8), U256::from(8u8)), U256::from(4u8));
        assert_eq!(sar(U256::from(300u16), minus_eight), !U256::ZERO);
        assert_eq!(sar(U256::from(300u16), U256::from(8u8)), U256::ZERO);
    }

    #[test]
    fn signed_comparison_orders_across_zero() {
        let minus_one = negate(U256::from(1u8));
        assert!(signed_lt(minus_one, U256::ZERO));
        assert!(signed_lt(minus_one, U256::from(1u8)));
        assert!(!signed_lt(U256::from(1u8), minus_one));
    }

    #[test]
    fn exp_wraps_on_overflow() {
        // 2^256 wraps to zero.
        assert_eq!(wrapping_exp(U256::from(2u8), U256::from(256u16)), U256::ZERO);
        assert_eq!(wrapping_exp(U256::from(3u8), U256::from(4u8)), U256::from(81u8));
        assert_eq!(wrapping_exp(U256::from(7u8), U256::ZERO), U256::from(1u8));
    }

    #[test]
    fn address_word_round_trip() {
        let addr = Address::new(AddressKind::Script, [0xabu8; 28]);
        let round = address_from_word(word_from_address(&addr));
        assert_eq!(round.payload, addr.payload);
    }

    #[test]
    fn jumpdest_analysis_skips_push_data() {
        // PUSH2 0x5b5b JUMPDEST
        let code = vec![0x61, 0x5b, 0x5b, 0x5b];
        let dests = analyze_jumpdests(&code);
        assert_eq!(dests, vec![false, false, false, true]);
    }
}
