//! # Driving Port
//!
//! The contract the consensus engine drives. Calls arrive strictly in block
//! order on one logical thread, except CheckTx which the mempool may issue at
//! any time; [`SharedApp`] serializes both.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::abci::{
    RequestBeginBlock, RequestEndBlock, RequestInitChain, RequestQuery, ResponseCheckTx,
    ResponseCommit, ResponseDeliverTx, ResponseEndBlock, ResponseInfo, ResponseInitChain,
    ResponseQuery,
};

/// ABCI-style application callbacks.
pub trait Application {
    fn info(&self) -> ResponseInfo;

    fn init_chain(&mut self, req: RequestInitChain) -> ResponseInitChain;

    fn begin_block(&mut self, req: RequestBeginBlock);

    fn check_tx(&mut self, tx: &[u8]) -> ResponseCheckTx;

    fn deliver_tx(&mut self, tx: &[u8]) -> ResponseDeliverTx;

    fn end_block(&mut self, req: RequestEndBlock) -> ResponseEndBlock;

    fn commit(&mut self) -> ResponseCommit;

    fn query(&self, req: RequestQuery) -> ResponseQuery;
}

/// An application shared between the consensus and mempool connections.
pub struct SharedApp<A: Application> {
    inner: Arc<Mutex<A>>,
}

impl<A: Application> Clone for SharedApp<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Application> SharedApp<A> {
    pub fn new(app: A) -> Self {
        Self {
            inner: Arc::new(Mutex::new(app)),
        }
    }

    /// Runs `f` with exclusive access to the application.
    pub fn with<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn check_tx(&self, tx: &[u8]) -> ResponseCheckTx {
        self.inner.lock().check_tx(tx)
    }

    pub fn deliver_tx(&self, tx: &[u8]) -> ResponseDeliverTx {
        self.inner.lock().deliver_tx(tx)
    }

    pub fn query(&self, req: RequestQuery) -> ResponseQuery {
        self.inner.lock().query(req)
    }
}
