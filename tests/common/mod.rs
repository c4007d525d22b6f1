#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use rox::lox::{Lox, RunError};

/// In‑memory `print` sink that stays readable after the session takes it.
#[derive(Clone, Default)]
pub struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A session wired to a fresh buffer.
pub fn session() -> (Lox, SharedBuf) {
    let buf = SharedBuf::default();
    (Lox::with_output(Box::new(buf.clone())), buf)
}

/// Run `source` in a fresh session, returning everything printed.
pub fn run(source: &str) -> (String, Result<(), RunError>) {
    let (mut lox, buf) = session();
    let result = lox.run(source.as_bytes());
    (buf.contents(), result)
}

/// Run `source` and insist it succeeds.
pub fn output_of(source: &str) -> String {
    let (out, result) = run(source);
    if let Err(e) = result {
        panic!("program failed: {}\noutput so far:\n{}", e, out);
    }
    out
}

/// Messages of every diagnostic, without location decoration.
pub fn messages(error: &RunError) -> Vec<String> {
    error.diagnostics().iter().map(|e| e.message()).collect()
}
