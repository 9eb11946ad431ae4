use std::cell::RefCell;
use std::rc::Rc;

use web_sys::Element;
use yew::prelude::*;

use crossbridge_core::protocol::DimensionsData;
use crossbridge_core::{AgentMsg, CellId, HostConfig, HostMsg};

use crate::host_controller::{HostController, HostError, HostHooks, LoadStatus, PuzzleSource};

/// Shared access to the mounted controller so a parent can push commands.
#[derive(Clone, Default)]
pub struct PuzzleFrameHandle {
    slot: Rc<RefCell<Option<HostController>>>,
}

impl PartialEq for PuzzleFrameHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

impl PuzzleFrameHandle {
    pub fn is_mounted(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn is_bridged(&self) -> bool {
        self.slot
            .borrow()
            .as_ref()
            .map(HostController::is_bridged)
            .unwrap_or(false)
    }

    pub fn send(&self, message: &HostMsg) -> Result<(), HostError> {
        match self.slot.borrow().as_ref() {
            Some(controller) => controller.send(message),
            None => Err(HostError::Unreachable),
        }
    }

    pub fn request_state(&self) -> Result<(), HostError> {
        self.send(&HostMsg::GetState)
    }

    pub fn apply_remote_cell_update(&self, cell: CellId, value: &str) -> Result<(), HostError> {
        match self.slot.borrow().as_ref() {
            Some(controller) => controller.apply_remote_cell_update(cell, value),
            None => Err(HostError::Unreachable),
        }
    }
}

#[derive(Properties, PartialEq)]
pub struct PuzzleFrameProps {
    pub source: PuzzleSource,
    #[prop_or_default]
    pub config: HostConfig,
    #[prop_or_default]
    pub class: Classes,
    #[prop_or_default]
    pub handle: Option<PuzzleFrameHandle>,
    #[prop_or_default]
    pub on_load: Option<Callback<LoadStatus>>,
    #[prop_or_default]
    pub on_error: Option<Callback<HostError>>,
    #[prop_or_default]
    pub on_dimensions_update: Option<Callback<DimensionsData>>,
    #[prop_or_default]
    pub on_event: Option<Callback<AgentMsg>>,
}

#[derive(Clone, Default)]
struct LatestCallbacks {
    on_load: Option<Callback<LoadStatus>>,
    on_error: Option<Callback<HostError>>,
    on_dimensions_update: Option<Callback<DimensionsData>>,
    on_event: Option<Callback<AgentMsg>>,
}

// Hooks read the newest callbacks on every call, so a parent re-render with
// fresh closures never forces the iframe to remount.
fn hooks_for(latest: Rc<RefCell<LatestCallbacks>>) -> HostHooks {
    let on_load = {
        let latest = latest.clone();
        Rc::new(move |status: LoadStatus| {
            let callback = latest.borrow().on_load.clone();
            if let Some(callback) = callback {
                callback.emit(status);
            }
        }) as Rc<dyn Fn(LoadStatus)>
    };
    let on_error = {
        let latest = latest.clone();
        Rc::new(move |error: HostError| {
            let callback = latest.borrow().on_error.clone();
            if let Some(callback) = callback {
                callback.emit(error);
            }
        }) as Rc<dyn Fn(HostError)>
    };
    let on_dimensions_update = {
        let latest = latest.clone();
        Rc::new(move |dimensions: DimensionsData| {
            let callback = latest.borrow().on_dimensions_update.clone();
            if let Some(callback) = callback {
                callback.emit(dimensions);
            }
        }) as Rc<dyn Fn(DimensionsData)>
    };
    let on_puzzle_event = Rc::new(move |message: AgentMsg| {
        let callback = latest.borrow().on_event.clone();
        if let Some(callback) = callback {
            callback.emit(message);
        }
    }) as Rc<dyn Fn(AgentMsg)>;
    HostHooks {
        on_load: Some(on_load),
        on_error: Some(on_error),
        on_dimensions_update: Some(on_dimensions_update),
        on_puzzle_event: Some(on_puzzle_event),
    }
}

/// Embeds a legacy crossword and bridges it to the surrounding app.
#[function_component(PuzzleFrame)]
pub fn puzzle_frame(props: &PuzzleFrameProps) -> Html {
    let container = use_node_ref();
    let latest = use_mut_ref(LatestCallbacks::default);
    *latest.borrow_mut() = LatestCallbacks {
        on_load: props.on_load.clone(),
        on_error: props.on_error.clone(),
        on_dimensions_update: props.on_dimensions_update.clone(),
        on_event: props.on_event.clone(),
    };
    let fallback_handle = use_memo((), |_| PuzzleFrameHandle::default());
    let handle = props
        .handle
        .clone()
        .unwrap_or_else(|| (*fallback_handle).clone());

    {
        let container = container.clone();
        let latest = latest.clone();
        use_effect_with(
            (props.source.clone(), props.config.clone(), handle),
            move |(source, config, handle)| {
                let slot = handle.slot.clone();
                match container.cast::<Element>() {
                    Some(element) => match HostController::mount(
                        &element,
                        source.clone(),
                        config.clone(),
                        hooks_for(latest.clone()),
                    ) {
                        Ok(controller) => {
                            *slot.borrow_mut() = Some(controller);
                        }
                        Err(err) => {
                            gloo::console::warn!("host: mount failed", err.to_string());
                            let callback = latest.borrow().on_error.clone();
                            if let Some(callback) = callback {
                                callback.emit(err);
                            }
                        }
                    },
                    None => {
                        gloo::console::warn!("host: puzzle container missing at mount");
                    }
                }
                move || {
                    // Dropping the controller unmounts the iframe.
                    slot.borrow_mut().take();
                }
            },
        );
    }

    html! {
        <div ref={container} class={classes!("crossbridge-frame", props.class.clone())} />
    }
}
