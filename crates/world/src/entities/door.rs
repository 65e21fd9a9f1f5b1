//! A door that may be open or closed, with animated transitions.
//!
//! Transitional states are never persisted: opening saves as open and
//! closing saves as closed, a contract shared with legacy save data.

/// Ticks an opening or closing animation takes to finish.
pub const DOOR_TRANSITION_TICKS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Open,
    Opening,
    Closed,
    Closing,
}

#[derive(Debug, Clone)]
pub struct Door {
    state: DoorState,
    transition_ticks_left: u32,
    /// Save key for this door's terminal state, if the door is saved.
    savegame_variable: Option<String>,
}

impl Door {
    pub fn new(initially_open: bool, savegame_variable: Option<String>) -> Self {
        Self {
            state: if initially_open {
                DoorState::Open
            } else {
                DoorState::Closed
            },
            transition_ticks_left: 0,
            savegame_variable,
        }
    }

    pub fn state(&self) -> DoorState {
        self.state
    }

    pub fn savegame_variable(&self) -> Option<&str> {
        self.savegame_variable.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.state == DoorState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state == DoorState::Closed
    }

    pub fn is_changing(&self) -> bool {
        matches!(self.state, DoorState::Opening | DoorState::Closing)
    }

    /// A door blocks everything until it is fully open.
    pub fn is_obstacle(&self) -> bool {
        self.state != DoorState::Open
    }

    /// Starts opening. No-op when already open or opening.
    pub fn open(&mut self) {
        match self.state {
            DoorState::Open | DoorState::Opening => {}
            DoorState::Closed | DoorState::Closing => {
                self.state = DoorState::Opening;
                self.transition_ticks_left = DOOR_TRANSITION_TICKS;
            }
        }
    }

    /// Starts closing. No-op when already closed or closing.
    pub fn close(&mut self) {
        match self.state {
            DoorState::Closed | DoorState::Closing => {}
            DoorState::Open | DoorState::Opening => {
                self.state = DoorState::Closing;
                self.transition_ticks_left = DOOR_TRANSITION_TICKS;
            }
        }
    }

    /// Jumps straight to a terminal state, skipping the transition.
    /// Used when restoring from a save.
    pub fn set_open(&mut self, open: bool) {
        self.state = if open {
            DoorState::Open
        } else {
            DoorState::Closed
        };
        self.transition_ticks_left = 0;
    }

    /// The state written to a save: the terminal counterpart of
    /// whatever the door is currently doing.
    pub fn saved_as_open(&self) -> bool {
        matches!(self.state, DoorState::Open | DoorState::Opening)
    }

    /// Advances the transition timer. Returns true when the door
    /// reached a terminal state this tick.
    pub fn update(&mut self) -> bool {
        if !self.is_changing() {
            return false;
        }
        self.transition_ticks_left = self.transition_ticks_left.saturating_sub(1);
        if self.transition_ticks_left > 0 {
            return false;
        }
        self.state = match self.state {
            DoorState::Opening => DoorState::Open,
            DoorState::Closing => DoorState::Closed,
            terminal => terminal,
        };
        true
    }
}
