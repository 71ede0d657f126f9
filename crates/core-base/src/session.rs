//! The per-run session: CRTC state, the filter table, ramp coalescing, and
//! the asynchronous install loop.
//!
//! Filter ramps live in an arena indexed by the update slots. Coalescing
//! releases a slave's own arena entry and points its slot at the master's
//! entry, so the sharing is by index and a slave can never free storage it
//! does not own.

use crate::proc;
use crate::run::RunError;
use core_client::{
    AsyncToken, ClientError, Connection, CrtcInfo, Events, FilterRequest, Lifespan, Support, wait,
};
use core_ramps::Ramps;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Pick the lifespan the common flags ask for.
pub fn lifespan_from_flags(remove: bool, until_death: bool) -> Lifespan {
    if remove {
        Lifespan::Remove
    } else if until_death {
        Lifespan::UntilDeath
    } else {
        Lifespan::UntilRemoval
    }
}

/// One filter to keep in sync with the daemon.
#[derive(Debug)]
pub struct UpdateSlot {
    /// Index into the session's CRTC tables.
    pub crtc: usize,
    /// Index into the tool's class-suffix list this slot was built for.
    pub suffix: usize,
    pub class: String,
    pub priority: i64,
    pub lifespan: Lifespan,
    /// Whether this slot owns its ramp storage. Exactly one master exists
    /// per coalescing group.
    pub master: bool,
    /// Slots aliasing this master's ramps.
    pub slaves: Vec<usize>,
    pub synced: bool,
    pub failed: bool,
    /// First structured error the daemon reported for this slot.
    pub pending_error: Option<core_client::DaemonError>,
    /// Arena index of the ramp storage; shared with the master when this
    /// slot is a slave.
    ramp: usize,
}

/// How a keep-alive phase ended.
#[derive(Debug, PartialEq, Eq)]
pub enum KeepAliveEnd {
    /// The cooperative termination flag was raised.
    Interrupted,
}

pub struct Session {
    pub conn: Connection,
    pub crtcs: Vec<String>,
    pub infos: Vec<CrtcInfo>,
    pub slots: Vec<UpdateSlot>,
    arena: Vec<Option<Ramps>>,
    tokens: Vec<Option<AsyncToken>>,
}

impl Session {
    /// Build the filter table: one slot per CRTC and class suffix, each
    /// starting with identity ramps sized by the CRTC's reported geometry.
    pub fn new(
        conn: Connection,
        crtcs: Vec<String>,
        infos: Vec<CrtcInfo>,
        class_base: &str,
        suffixes: &[&str],
        priority: i64,
    ) -> Session {
        let mut slots = Vec::with_capacity(crtcs.len() * suffixes.len());
        let mut arena = Vec::with_capacity(slots.capacity());
        for (crtc, info) in infos.iter().enumerate() {
            for (suffix, tail) in suffixes.iter().enumerate() {
                arena.push(Some(Ramps::identity(info.depth, info.sizes())));
                slots.push(UpdateSlot {
                    crtc,
                    suffix,
                    class: format!("{class_base}{tail}"),
                    priority,
                    lifespan: Lifespan::UntilRemoval,
                    master: true,
                    slaves: Vec::new(),
                    synced: false,
                    failed: false,
                    pending_error: None,
                    ramp: arena.len() - 1,
                });
            }
        }
        let tokens = vec![None; slots.len()];
        Session {
            conn,
            crtcs,
            infos,
            slots,
            arena,
            tokens,
        }
    }

    pub fn filters_n(&self) -> usize {
        self.slots.len()
    }

    /// The CRTC info behind a slot.
    pub fn info_of(&self, slot: usize) -> &CrtcInfo {
        &self.infos[self.slots[slot].crtc]
    }

    /// The ramp storage a slot submits (a slave sees its master's).
    pub fn ramps_mut(&mut self, slot: usize) -> Option<&mut Ramps> {
        self.arena[self.slots[slot].ramp].as_mut()
    }

    pub fn set_lifespans(&mut self, lifespan: Lifespan) {
        for slot in &mut self.slots {
            slot.lifespan = lifespan;
        }
    }

    /// Group slots whose CRTCs share ramp geometry and depth. The first
    /// slot of each group (in table order) becomes the master; the others
    /// release their own storage and alias the master's arena entry.
    pub fn make_slaves(&mut self) {
        let key_of = |session: &Session, slot: usize| {
            let info = &session.infos[session.slots[slot].crtc];
            (
                info.depth,
                info.red_size,
                info.green_size,
                info.blue_size,
            )
        };

        let mut order: Vec<usize> = (0..self.slots.len()).collect();
        order.sort_by_key(|&slot| (key_of(self, slot), slot));

        let mut start = 0;
        while start < order.len() {
            let master = order[start];
            let key = key_of(self, master);
            let mut end = start + 1;
            let mut slaves = Vec::new();
            while end < order.len() && key_of(self, order[end]) == key {
                let slave = order[end];
                self.arena[self.slots[slave].ramp] = None;
                self.slots[slave].ramp = self.slots[master].ramp;
                self.slots[slave].master = false;
                slaves.push(slave);
                end += 1;
            }
            if !slaves.is_empty() {
                debug!(
                    target: "base.coalesce",
                    master,
                    slaves = slaves.len(),
                    depth = ?key.0,
                    "ramp_group"
                );
            }
            self.slots[master].slaves = slaves;
            start = end;
        }
    }

    /// Number of live ramp buffers (one per coalescing group).
    pub fn ramp_buffers(&self) -> usize {
        self.arena.iter().filter(|entry| entry.is_some()).count()
    }

    /// Queue the `set_gamma` for one slot. The request is buffered even if
    /// the socket back-pressures; completion is observed later through
    /// [`Session::synchronise_pending`].
    pub fn update_filter(&mut self, slot: usize) -> Result<(), ClientError> {
        let header = &self.slots[slot];
        let ramps = if header.lifespan == Lifespan::Remove {
            None
        } else {
            self.arena[header.ramp].as_ref()
        };
        let request = FilterRequest {
            crtc: &self.crtcs[header.crtc],
            class: &header.class,
            priority: Some(header.priority),
            lifespan: header.lifespan,
            ramps,
        };
        let token = self.conn.set_gamma_send(&request)?;
        trace!(target: "base.session", slot, crtc = %self.crtcs[self.slots[slot].crtc], "filter_queued");
        self.tokens[slot] = Some(token);
        self.slots[slot].synced = false;
        Ok(())
    }

    /// Drive the readiness loop until every queued request has completed.
    /// Transient conditions re-arm. A structured daemon error is recorded on
    /// its slot without abandoning the others; the first one recorded is
    /// returned once the batch has fully completed. Only the unrecoverable
    /// server state aborts the loop early.
    pub fn synchronise_pending(&mut self) -> Result<(), ClientError> {
        loop {
            let mut tokens = Vec::new();
            let mut slot_of = Vec::new();
            for (slot, token) in self.tokens.iter().enumerate() {
                if let Some(token) = token {
                    if !self.slots[slot].synced {
                        tokens.push(*token);
                        slot_of.push(slot);
                    }
                }
            }
            if tokens.is_empty() && !self.conn.flush_pending() {
                for slot in &self.slots {
                    if let Some(err) = &slot.pending_error {
                        return Err(ClientError::Daemon(err.clone()));
                    }
                }
                return Ok(());
            }

            let mut interest = Events::READABLE | Events::PRIORITY;
            if self.conn.flush_pending() {
                interest |= Events::WRITABLE;
            }
            let ready = match wait(self.conn.as_raw_fd(), interest) {
                Ok(ready) => ready,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };

            if ready.intersects(Events::WRITABLE | Events::ERROR) {
                match self.conn.flush() {
                    Ok(()) => {}
                    Err(err)
                        if matches!(
                            err.kind(),
                            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
                        ) => {}
                    Err(err) => return Err(err.into()),
                }
            }

            if ready.intersects(Events::READABLE | Events::PRIORITY | Events::ERROR) {
                loop {
                    match self.conn.synchronise(&tokens) {
                        Ok(index) => {
                            let slot = slot_of[index];
                            self.slots[slot].synced = true;
                            match self.conn.set_gamma_recv(tokens[index]) {
                                Ok(()) => {}
                                Err(ClientError::Daemon(err)) => {
                                    self.slots[slot].failed = true;
                                    self.slots[slot].pending_error = Some(err);
                                }
                                Err(err) => return Err(err),
                            }
                        }
                        Err(err) if err.is_transient() => break,
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }

    /// Fill and submit every master (and its slaves), then wait for all
    /// completions. `skip_fill` submits the slots as they are, which is how
    /// removal requests go out.
    pub fn install(
        &mut self,
        skip_fill: bool,
        fill: &mut dyn FnMut(&UpdateSlot, &mut Ramps) -> Result<(), RunError>,
    ) -> Result<(), RunError> {
        for slot in 0..self.slots.len() {
            if !self.slots[slot].master {
                continue;
            }
            if self.infos[self.slots[slot].crtc].supported == Support::No {
                continue;
            }
            if !skip_fill {
                let ramp = self.slots[slot].ramp;
                let header = &self.slots[slot];
                let Some(ramps) = self.arena[ramp].as_mut() else {
                    continue;
                };
                fill(header, ramps)?;
            }
            self.update_filter(slot)?;
            for slave in self.slots[slot].slaves.clone() {
                self.update_filter(slave)?;
            }
        }
        self.synchronise_pending()?;
        Ok(())
    }

    /// Block on the connection until the daemon notifies or the link drops.
    ///
    /// Entered only after every install token has completed. When
    /// `interrupt` is given, an `EINTR` wake-up checks the flag and returns
    /// [`KeepAliveEnd::Interrupted`] once it is raised.
    pub fn keep_alive(
        &mut self,
        interrupt: Option<&AtomicBool>,
    ) -> Result<KeepAliveEnd, ClientError> {
        self.conn.set_nonblocking(false)?;
        loop {
            if let Some(flag) = interrupt {
                if flag.load(Ordering::Relaxed) {
                    return Ok(KeepAliveEnd::Interrupted);
                }
            }
            match self.conn.synchronise(&[]) {
                Ok(_) => continue,
                Err(err) if err.is_transient() => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Keep-alive for tools without a fade-in phase: never returns except
    /// to report a dropped connection. An unrecoverable server error parks
    /// the process; the daemon reclaims our filters when we finally die.
    pub fn run_keep_alive(&mut self) -> Result<(), RunError> {
        match self.keep_alive(None) {
            Ok(KeepAliveEnd::Interrupted) => Ok(()),
            Err(ClientError::Unrecoverable) => proc::park_forever(),
            Err(err) => Err(err.into()),
        }
    }
}
