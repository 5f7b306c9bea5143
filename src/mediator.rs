use log::{debug, info, warn};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::activity::Activity;
use crate::command::ParsedCommand;
use crate::content::{ContentSource, GamePhrase};
use crate::error::MediatorError;
use crate::location::Location;
use crate::observable::{Observable, ObservableView, Subscription};
use crate::progress::{TutorialProgress, COMPLETED_TUTORIALS_KEY};
use crate::store::{Store, TreeItem, STATUS_NOT_FOUND};

pub const TUTORIAL_COMMANDS: [&str; 2] = ["tut", "tutorial"];
pub const GAME_COMMANDS: [&str; 2] = ["play", "game"];
pub const TREE_COMMANDS: [&str; 2] = ["github", "tree"];
pub const COMPLETE_COMMAND: &str = "complete";
pub const EDIT_COMMAND: &str = "edit";

/// Results of queued events kept for [`ActivityMediator::process_pending`].
pub const MAX_DEFERRED: usize = 32;

/// Something that happened outside the mediator
#[derive(Clone, Debug, PartialEq)]
pub enum MediatorEvent {
    /// A command line finished executing.
    Command(ParsedCommand),
    /// Vim-style editor command (`:w`, `:q`, `:q!`, `:wq`) with the buffer to save.
    EditorCommand {
        command: String,
        content: Option<String>,
    },
    TreeItemSelected(TreeItem),
    CloseTree,
}

impl MediatorEvent {
    pub fn command(line: &str) -> Self {
        MediatorEvent::Command(ParsedCommand::parse(line))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: Activity,
    pub to: Activity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The event does not apply to the current activity.
    Ignored,
    /// Accepted by a [`MediatorSender`]; applied after the transition in flight or on
    /// the next drain.
    Queued,
    Applied(Transition),
}

/// Feeds events back into a mediator from places that cannot borrow it, such as
/// subscriber callbacks. Events are applied in arrival order after the transition
/// in flight finishes, or on the next [`ActivityMediator::process_pending`].
#[derive(Clone)]
pub struct MediatorSender {
    queue: Rc<RefCell<VecDeque<MediatorEvent>>>,
    in_flight: Rc<Cell<bool>>,
}

impl MediatorSender {
    pub fn send(&self, event: MediatorEvent) -> Outcome {
        self.queue.borrow_mut().push_back(event);
        Outcome::Queued
    }

    pub fn transition_in_progress(&self) -> bool {
        self.in_flight.get()
    }
}

/// Activity state machine.
///
/// Owns the current [`Activity`], the completed-tutorial set and the active
/// tutorial/game phrase. It classifies executed commands after the fact and never
/// runs them itself.
pub struct ActivityMediator {
    store: Rc<dyn Store>,
    content: Box<dyn ContentSource>,
    progress: TutorialProgress,
    activity: Observable<Activity>,
    previous: Option<Activity>,
    tutorial: Observable<Option<GamePhrase>>,
    game: Observable<Option<GamePhrase>>,
    game_queue: VecDeque<GamePhrase>,
    game_group: Option<String>,
    edit_target: Option<String>,
    edit_content: Option<String>,
    tree: Observable<Vec<TreeItem>>,
    tree_path: String,
    selected_item: Option<TreeItem>,
    location: Observable<Location>,
    in_flight: Rc<Cell<bool>>,
    queue: Rc<RefCell<VecDeque<MediatorEvent>>>,
    deferred: VecDeque<Result<Outcome, MediatorError>>,
}

impl fmt::Debug for ActivityMediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityMediator")
            .field("activity", &self.activity.get())
            .field("previous", &self.previous)
            .field("tutorial", &self.tutorial.get())
            .field("game", &self.game.get())
            .field("completed", &self.progress.len())
            .finish()
    }
}

impl ActivityMediator {
    /// Build the mediator and pick the starting activity from `location` and the
    /// persisted tutorial progress.
    pub fn new(location: &Location, store: Rc<dyn Store>, content: Box<dyn ContentSource>) -> Self {
        let progress = TutorialProgress::load(store.as_ref());
        let mut mediator = Self {
            store,
            content,
            progress,
            activity: Observable::new(Activity::Normal),
            previous: None,
            tutorial: Observable::new(None),
            game: Observable::new(None),
            game_queue: VecDeque::new(),
            game_group: None,
            edit_target: None,
            edit_content: None,
            tree: Observable::new(Vec::new()),
            tree_path: String::new(),
            selected_item: None,
            location: Observable::new(Location::default()),
            in_flight: Rc::new(Cell::new(false)),
            queue: Rc::new(RefCell::new(VecDeque::new())),
            deferred: VecDeque::new(),
        };

        let requested = mediator.requested_activity(location);
        let initial = mediator.enter_initial(requested, location);
        info!("starting in {initial} (requested {requested})");
        mediator.location.set(mediator.location_for(initial));
        mediator.activity.set(initial);
        mediator
    }

    fn requested_activity(&self, location: &Location) -> Activity {
        let all_done = self.all_tutorials_complete();
        let requested = if location.activity_key.is_empty() {
            if all_done {
                Activity::Normal
            } else {
                Activity::Tutorial
            }
        } else {
            location.activity_key.parse().unwrap_or_else(|err| {
                warn!("{err}; starting in normal");
                Activity::Normal
            })
        };

        if all_done && requested == Activity::Tutorial {
            Activity::Normal
        } else {
            requested
        }
    }

    fn enter_initial(&mut self, requested: Activity, location: &Location) -> Activity {
        let group = location.group_key.as_deref();
        let entered = match requested {
            Activity::Normal => true,
            Activity::Tutorial => {
                let phrase = location
                    .content_key
                    .as_deref()
                    .and_then(|key| {
                        self.content
                            .tutorials()
                            .iter()
                            .find(|p| p.key == key && !self.progress.contains(key))
                            .cloned()
                    })
                    .or_else(|| self.first_tutorial(group));
                let found = phrase.is_some();
                self.tutorial.set(phrase);
                found
            }
            Activity::Game => self.load_game(group, location.content_key.as_deref()),
            Activity::Edit => match location.content_key.as_deref() {
                Some(target) => self.open_edit_target(target).is_ok(),
                None => false,
            },
            Activity::Tree => {
                let path = location.content_key.clone().unwrap_or_default();
                match self.fetch_tree(&path) {
                    Ok(()) => {
                        self.previous = Some(Activity::Normal);
                        true
                    }
                    Err(_) => false,
                }
            }
        };

        if entered {
            requested
        } else {
            Activity::Normal
        }
    }

    /// Apply an event, then anything queued while it was in flight.
    pub fn handle(&mut self, event: MediatorEvent) -> Result<Outcome, MediatorError> {
        let result = self.apply(event);
        self.drain_queue();
        result
    }

    /// Convenience for [`MediatorEvent::Command`].
    pub fn handle_command(&mut self, line: &str) -> Result<Outcome, MediatorError> {
        self.handle(MediatorEvent::command(line))
    }

    /// Apply queued events and return the results of deferred events so far, oldest
    /// first. Only the last [`MAX_DEFERRED`] results are kept between calls.
    pub fn process_pending(&mut self) -> Vec<Result<Outcome, MediatorError>> {
        self.drain_queue();
        self.deferred.drain(..).collect()
    }

    pub fn sender(&self) -> MediatorSender {
        MediatorSender {
            queue: Rc::clone(&self.queue),
            in_flight: Rc::clone(&self.in_flight),
        }
    }

    fn apply(&mut self, event: MediatorEvent) -> Result<Outcome, MediatorError> {
        self.in_flight.set(true);
        let result = self.dispatch(event);
        self.in_flight.set(false);
        result
    }

    fn drain_queue(&mut self) {
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(event) = next else { break };
            let result = self.apply(event);
            if let Err(err) = &result {
                warn!("queued event failed: {err}");
            }
            if self.deferred.len() == MAX_DEFERRED {
                self.deferred.pop_front();
            }
            self.deferred.push_back(result);
        }
    }

    fn dispatch(&mut self, event: MediatorEvent) -> Result<Outcome, MediatorError> {
        match event {
            MediatorEvent::Command(cmd) => self.on_command(&cmd),
            MediatorEvent::EditorCommand { command, content } => {
                self.on_editor_command(&command, content)
            }
            MediatorEvent::TreeItemSelected(item) => self.on_tree_item(item),
            MediatorEvent::CloseTree => match self.current() {
                Activity::Tree => Ok(self.return_from_tree()),
                _ => Ok(Outcome::Ignored),
            },
        }
    }

    fn on_command(&mut self, cmd: &ParsedCommand) -> Result<Outcome, MediatorError> {
        let current = self.current();
        let name = cmd.command.as_str();

        if TREE_COMMANDS.contains(&name) {
            return self.enter_tree(cmd.arg(0).unwrap_or(""));
        }
        if name == EDIT_COMMAND {
            return match (current, cmd.arg(0)) {
                (Activity::Normal | Activity::Tutorial | Activity::Game, Some(target)) => {
                    self.enter_edit(target)
                }
                _ => Ok(Outcome::Ignored),
            };
        }

        match current {
            Activity::Normal => {
                let group = cmd.value("group").or(cmd.arg(0));
                if TUTORIAL_COMMANDS.contains(&name) {
                    self.start_tutorial(group, cmd.flag("reset"))
                } else if GAME_COMMANDS.contains(&name) {
                    if self.load_game(group, None) {
                        Ok(self.set_activity(Activity::Game))
                    } else {
                        Ok(Outcome::Ignored)
                    }
                } else {
                    Ok(Outcome::Ignored)
                }
            }
            Activity::Tutorial => self.on_tutorial_submission(cmd.phrase()),
            Activity::Game => {
                if name == COMPLETE_COMMAND {
                    Ok(self.finish_game())
                } else {
                    Ok(self.on_game_submission(cmd.phrase()))
                }
            }
            Activity::Edit => {
                if name.starts_with(':') {
                    self.on_editor_command(name, None)
                } else {
                    Ok(Outcome::Ignored)
                }
            }
            Activity::Tree => Ok(Outcome::Ignored),
        }
    }

    fn first_tutorial(&self, group: Option<&str>) -> Option<GamePhrase> {
        match group {
            Some(g) => self
                .content
                .incomplete_in_group(Some(g), &self.progress)
                .into_iter()
                .next(),
            None => self.content.next_tutorial(&self.progress, None),
        }
    }

    fn start_tutorial(
        &mut self,
        group: Option<&str>,
        reset: bool,
    ) -> Result<Outcome, MediatorError> {
        if reset {
            let before = self.progress.clone();
            self.progress.reset();
            let response = self.progress.save(self.store.as_ref());
            if !response.is_success() {
                self.progress = before;
                return Err(persistence_error(
                    COMPLETED_TUTORIALS_KEY,
                    response.status,
                    response.error_message(),
                ));
            }
            info!("tutorial progress reset");
        }

        match self.first_tutorial(group) {
            Some(phrase) => {
                self.tutorial.set(Some(phrase));
                Ok(self.set_activity(Activity::Tutorial))
            }
            None => Ok(Outcome::Ignored),
        }
    }

    fn on_tutorial_submission(&mut self, submitted: &str) -> Result<Outcome, MediatorError> {
        let Some(current) = self.tutorial.get() else {
            return Ok(Outcome::Ignored);
        };
        if !current.matches(submitted) {
            return Ok(Outcome::Ignored);
        }

        if self.progress.mark_pending(&current.key) {
            let response = self.progress.save(self.store.as_ref());
            if !response.is_success() {
                self.progress.rollback();
                warn!(
                    "tutorial '{}' not recorded: {}",
                    current.key.escape_debug(),
                    response.error_message()
                );
                return Err(persistence_error(
                    COMPLETED_TUTORIALS_KEY,
                    response.status,
                    response.error_message(),
                ));
            }
            self.progress.commit();
        }

        let group = current.tutorial_group.as_deref();
        if let Some(next) = self
            .content
            .incomplete_in_group(group, &self.progress)
            .into_iter()
            .next()
        {
            self.tutorial.set(Some(next));
            return Ok(self.set_activity(Activity::Tutorial));
        }

        self.tutorial.set(None);
        let unlocked = group.is_some() && self.load_game(group, None);
        if unlocked {
            Ok(self.set_activity(Activity::Game))
        } else {
            Ok(self.set_activity(Activity::Normal))
        }
    }

    /// Queue the games of `group`, optionally starting at `start_key`.
    fn load_game(&mut self, group: Option<&str>, start_key: Option<&str>) -> bool {
        let mut phrases: VecDeque<GamePhrase> = self.content.game_phrases(group).into();
        if let Some(key) = start_key {
            if let Some(idx) = phrases.iter().position(|p| p.key == key) {
                phrases.drain(..idx);
            }
        }

        let Some(first) = phrases.pop_front() else {
            return false;
        };
        self.game.set(Some(first));
        self.game_queue = phrases;
        self.game_group = group.map(str::to_string);
        true
    }

    fn on_game_submission(&mut self, submitted: &str) -> Outcome {
        let Some(current) = self.game.get() else {
            return Outcome::Ignored;
        };
        if !current.matches(submitted) {
            return Outcome::Ignored;
        }

        match self.game_queue.pop_front() {
            Some(next) => {
                self.game.set(Some(next));
                self.set_activity(Activity::Game)
            }
            None => self.finish_game(),
        }
    }

    fn finish_game(&mut self) -> Outcome {
        self.game_queue.clear();
        self.game_group = None;
        self.game.set(None);
        self.set_activity(Activity::Normal)
    }

    fn open_edit_target(&mut self, target: &str) -> Result<(), MediatorError> {
        let response = self.store.get_file(target);
        let content = match (response.status, response.data) {
            (STATUS_NOT_FOUND, _) => String::new(),
            (_, Some(content)) if response.error.is_none() => content,
            (status, _) => {
                return Err(persistence_error(
                    target,
                    status,
                    response.error.unwrap_or_default(),
                ))
            }
        };
        self.edit_target = Some(target.to_string());
        self.edit_content = Some(content);
        Ok(())
    }

    fn enter_edit(&mut self, target: &str) -> Result<Outcome, MediatorError> {
        self.open_edit_target(target)?;
        self.tutorial.set(None);
        self.game_queue.clear();
        self.game.set(None);
        Ok(self.set_activity(Activity::Edit))
    }

    fn on_editor_command(
        &mut self,
        command: &str,
        content: Option<String>,
    ) -> Result<Outcome, MediatorError> {
        if self.current() != Activity::Edit {
            return Ok(Outcome::Ignored);
        }

        match command.trim() {
            ":w" => {
                self.save_edit(content)?;
                Ok(self.set_activity(Activity::Edit))
            }
            ":wq" | ":x" => {
                self.save_edit(content)?;
                Ok(self.exit_edit())
            }
            ":q" | ":q!" => Ok(self.exit_edit()),
            _ => Ok(Outcome::Ignored),
        }
    }

    fn save_edit(&mut self, content: Option<String>) -> Result<(), MediatorError> {
        let Some(target) = self.edit_target.clone() else {
            return Ok(());
        };
        let content = content
            .or_else(|| self.edit_content.clone())
            .unwrap_or_default();

        let response = self.store.put_file(&target, &content);
        if !response.is_success() {
            return Err(persistence_error(
                &target,
                response.status,
                response.error_message(),
            ));
        }
        debug!("saved {target}");
        self.edit_content = Some(content);
        Ok(())
    }

    fn exit_edit(&mut self) -> Outcome {
        self.edit_target = None;
        self.edit_content = None;
        self.set_activity(Activity::Normal)
    }

    fn fetch_tree(&mut self, path: &str) -> Result<(), MediatorError> {
        let response = self.store.list_tree(path);
        if !response.is_success() {
            return Err(MediatorError::TreeListing {
                path: path.to_string(),
                status: response.status,
                message: response.error_message(),
            });
        }
        self.tree.set(response.data.unwrap_or_default());
        self.tree_path = path.trim_matches('/').to_string();
        Ok(())
    }

    fn enter_tree(&mut self, path: &str) -> Result<Outcome, MediatorError> {
        self.fetch_tree(path)?;
        let current = self.current();
        if !current.returns_to_previous() {
            self.previous = Some(current);
        }
        Ok(self.set_activity(Activity::Tree))
    }

    fn on_tree_item(&mut self, item: TreeItem) -> Result<Outcome, MediatorError> {
        if self.current() != Activity::Tree {
            return Ok(Outcome::Ignored);
        }
        if item.is_directory() {
            return self.enter_tree(&item.path);
        }
        self.selected_item = Some(item);
        Ok(self.return_from_tree())
    }

    fn return_from_tree(&mut self) -> Outcome {
        let to = self.previous.take().unwrap_or_default();
        self.tree.set(Vec::new());
        self.tree_path.clear();
        self.set_activity(to)
    }

    fn location_for(&self, activity: Activity) -> Location {
        let location = Location::new(activity.to_string());
        match activity {
            Activity::Normal => location,
            Activity::Tutorial => match self.tutorial.get() {
                Some(phrase) => {
                    let mut location = location.with_content(phrase.key);
                    location.group_key = phrase.tutorial_group;
                    location
                }
                None => location,
            },
            Activity::Game => {
                let mut location = match self.game.get() {
                    Some(phrase) => location.with_content(phrase.key),
                    None => location,
                };
                location.group_key = self.game_group.clone();
                location
            }
            Activity::Edit => match &self.edit_target {
                Some(target) => location.with_content(target.clone()),
                None => location,
            },
            Activity::Tree if self.tree_path.is_empty() => location,
            Activity::Tree => location.with_content(self.tree_path.clone()),
        }
    }

    fn set_activity(&mut self, to: Activity) -> Outcome {
        let from = self.current();
        debug!("activity {from} -> {to}");
        self.location.set(self.location_for(to));
        self.activity.set(to);
        Outcome::Applied(Transition { from, to })
    }

    pub fn current(&self) -> Activity {
        self.activity.get()
    }

    pub fn previous(&self) -> Option<Activity> {
        self.previous
    }

    pub fn is_transition_in_progress(&self) -> bool {
        self.in_flight.get()
    }

    /// Call `callback` with every new activity until the subscription is dropped.
    pub fn subscribe(&self, callback: impl Fn(&Activity) + 'static) -> Subscription<Activity> {
        self.activity.subscribe(callback)
    }

    pub fn activity(&self) -> ObservableView<'_, Activity> {
        self.activity.view()
    }

    pub fn tutorial(&self) -> ObservableView<'_, Option<GamePhrase>> {
        self.tutorial.view()
    }

    pub fn game(&self) -> ObservableView<'_, Option<GamePhrase>> {
        self.game.view()
    }

    pub fn tree(&self) -> ObservableView<'_, Vec<TreeItem>> {
        self.tree.view()
    }

    pub fn location(&self) -> ObservableView<'_, Location> {
        self.location.view()
    }

    pub fn progress(&self) -> &TutorialProgress {
        &self.progress
    }

    pub fn all_tutorials_complete(&self) -> bool {
        self.progress.covers(self.content.tutorial_keys())
    }

    pub fn remaining_games(&self) -> usize {
        self.game_queue.len()
    }

    pub fn edit_target(&self) -> Option<&str> {
        self.edit_target.as_deref()
    }

    pub fn edit_content(&self) -> Option<&str> {
        self.edit_content.as_deref()
    }

    pub fn selected_item(&self) -> Option<&TreeItem> {
        self.selected_item.as_ref()
    }
}

fn persistence_error(key: &str, status: u16, message: String) -> MediatorError {
    MediatorError::Persistence {
        key: key.to_string(),
        status,
        message,
    }
}
