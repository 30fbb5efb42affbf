use anyhow::{anyhow, bail, Result};
use tracing::{debug, info, warn};

use super::Editor;
use crate::grid::{Axis, Strategy, TableRefinement, TableSettings};
use crate::history::History;
use crate::interaction::{InsertHint, Interaction};
use crate::providers::{GridProvider, GridRequest, GridResponse, GridTicket};
use crate::region::{RegionSet, RegionType};

/// Live table refinement plus its own undo timeline.
#[derive(Debug, Clone)]
pub struct RefineSession {
    pub(super) state: TableRefinement,
    pub(super) history: History<TableRefinement>,
    regions_at_entry: RegionSet,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum GridPurpose {
    Enter { region_id: String },
    Reanalyze,
}

#[derive(Debug, Clone)]
pub(super) struct PendingGrid {
    ticket: GridTicket,
    settings: TableSettings,
    purpose: GridPurpose,
}

impl Editor {
    pub fn is_refining(&self) -> bool {
        self.refine.is_some()
    }

    pub fn table(&self) -> Option<&TableRefinement> {
        self.refine.as_ref().map(|session| &session.state)
    }

    pub fn insert_hint(&self) -> Option<InsertHint> {
        self.insert_hint
    }

    pub fn has_pending_grid(&self) -> bool {
        self.pending.is_some()
    }

    fn issue(&mut self, region_id: &str, settings: TableSettings, purpose: GridPurpose) -> Result<GridRequest> {
        let rect = self
            .regions
            .get(region_id)
            .map(|region| region.rect)
            .ok_or_else(|| anyhow!("region {} not found", region_id))?;
        self.next_ticket += 1;
        let ticket = GridTicket(self.next_ticket);
        if let Some(previous) = &self.pending {
            debug!("grid request {:?} superseded by {:?}", previous.ticket, ticket);
        }
        self.pending = Some(PendingGrid {
            ticket,
            settings: settings.clone(),
            purpose,
        });
        Ok(GridRequest {
            ticket,
            page: self.page.clone(),
            region_id: region_id.to_string(),
            rect,
            settings,
        })
    }

    /// Starts entering table refinement. The session opens once the returned
    /// request resolves through [`Editor::resolve_grid`].
    pub fn request_table_refine(&mut self, region_id: &str) -> Result<GridRequest> {
        let region = self
            .regions
            .get(region_id)
            .ok_or_else(|| anyhow!("region {} not found", region_id))?;
        if region.kind != RegionType::Table {
            bail!("region {} is a {}, not a table", region_id, region.kind.as_str());
        }
        let settings = region
            .table_settings
            .clone()
            .unwrap_or_else(|| self.config.table_defaults.clone());
        // An open session is closed first so its edits are recorded against
        // its own entry baseline, even when the same table is entered again.
        self.exit_table_refine();
        let purpose = GridPurpose::Enter {
            region_id: region_id.to_string(),
        };
        self.issue(region_id, settings, purpose)
    }

    /// Re-requests the grid with the current lines as explicit strategies.
    pub fn request_table_reanalysis(&mut self) -> Result<GridRequest> {
        let session = self
            .refine
            .as_ref()
            .ok_or_else(|| anyhow!("no table is being refined"))?;
        let region_id = session.state.region_id.clone();
        let settings = session.state.explicit_settings();
        self.issue(&region_id, settings, GridPurpose::Reanalyze)
    }

    pub(super) fn issue_reanalysis(&mut self) -> Option<GridRequest> {
        match self.request_table_reanalysis() {
            Ok(request) => Some(request),
            Err(err) => {
                warn!("{}", err);
                None
            }
        }
    }

    /// Re-requests the grid with edited detection settings.
    pub fn apply_table_settings(&mut self, settings: TableSettings) -> Result<GridRequest> {
        let session = self
            .refine
            .as_ref()
            .ok_or_else(|| anyhow!("no table is being refined"))?;
        let region_id = session.state.region_id.clone();
        self.issue(&region_id, settings, GridPurpose::Reanalyze)
    }

    /// Applies a grid response. Stale tickets are ignored (`Ok(false)`); a
    /// failure restores the last recorded grid and is returned to the caller.
    pub fn resolve_grid(&mut self, ticket: GridTicket, result: Result<GridResponse>) -> Result<bool> {
        if self.pending.as_ref().is_none_or(|pending| pending.ticket != ticket) {
            debug!("discarding stale grid response {:?}", ticket);
            return Ok(false);
        }
        let Some(pending) = self.pending.take() else {
            return Ok(false);
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                if let Some(session) = self.refine.as_mut()
                    && let Some(current) = session.history.current()
                {
                    session.state = current.clone();
                }
                self.interaction = Interaction::Idle;
                return Err(err.context("table analysis failed"));
            }
        };

        match pending.purpose {
            GridPurpose::Enter { region_id } => {
                if !self.regions.contains(&region_id) {
                    bail!("region {} disappeared before its grid arrived", region_id);
                }
                let regions_at_entry = self.regions.clone();
                self.apply_snapped_bbox(&region_id, &response);
                let state = TableRefinement::new(
                    region_id.clone(),
                    &response.rows,
                    &response.cols,
                    response.preview.unwrap_or_default(),
                    pending.settings,
                );
                info!(
                    "refining {}: {} rows x {} cols",
                    region_id,
                    state.rows().len().saturating_sub(1),
                    state.cols().len().saturating_sub(1)
                );
                self.refine = Some(RefineSession {
                    history: History::new(state.clone(), self.config.history_limit),
                    state,
                    regions_at_entry,
                });
                self.selected = Some(region_id);
                self.interaction = Interaction::Idle;
                self.insert_hint = None;
            }
            GridPurpose::Reanalyze => {
                let Some(region_id) = self.refine.as_ref().map(|s| s.state.region_id.clone()) else {
                    debug!("grid response arrived after refinement ended");
                    return Ok(false);
                };
                self.apply_snapped_bbox(&region_id, &response);
                let state = TableRefinement::new(
                    region_id,
                    &response.rows,
                    &response.cols,
                    response.preview.unwrap_or_default(),
                    pending.settings,
                );
                if let Some(session) = self.refine.as_mut() {
                    session.history.record(&state);
                    session.state = state;
                }
            }
        }
        Ok(true)
    }

    fn apply_snapped_bbox(&mut self, region_id: &str, response: &GridResponse) {
        let Some(snapped) = response.snapped_bbox else {
            return;
        };
        if self.regions.set_rect(region_id, snapped) {
            debug!("snapped {} to {:?}", region_id, snapped);
        }
    }

    pub fn insert_table_line(&mut self, axis: Axis, offset: f64) -> Option<GridRequest> {
        let session = self.refine.as_mut()?;
        if !session.state.insert_line(axis, offset) {
            return None;
        }
        self.issue_reanalysis()
    }

    pub fn delete_table_line(&mut self, axis: Axis, index: usize) -> Option<GridRequest> {
        let session = self.refine.as_mut()?;
        if !session.state.remove_line(axis, index) {
            return None;
        }
        self.issue_reanalysis()
    }

    pub fn move_table_line(&mut self, axis: Axis, index: usize, offset: f64) -> Option<GridRequest> {
        let session = self.refine.as_mut()?;
        if !session.state.move_line(axis, index, offset) {
            return None;
        }
        self.issue_reanalysis()
    }

    pub fn toggle_axis_lock(&mut self, axis: Axis) -> bool {
        let Some(session) = self.refine.as_mut() else {
            return false;
        };
        session.state.settings.toggle_lock(axis);
        session.history.record(&session.state);
        true
    }

    /// Changes one axis' detection strategy and re-requests the grid.
    pub fn set_axis_strategy(&mut self, axis: Axis, strategy: Strategy) -> Option<GridRequest> {
        let session = self.refine.as_mut()?;
        let mut settings = session.state.settings.clone();
        if !settings.set_strategy(axis, strategy) {
            return None;
        }
        match self.apply_table_settings(settings) {
            Ok(request) => Some(request),
            Err(err) => {
                warn!("{}", err);
                None
            }
        }
    }

    /// Stores the refined settings as the table region's detection rules.
    pub fn commit_table_rules(&mut self) -> bool {
        let Some(session) = &self.refine else {
            return false;
        };
        let region_id = session.state.region_id.clone();
        let settings = session.state.settings.clone();
        let changed = self.regions.set_table_settings(&region_id, settings);
        if changed {
            info!("committed table rules for {}", region_id);
        }
        changed
    }

    /// Leaves refinement, cancelling any outstanding request. Region changes
    /// made while refining become one region-history entry.
    pub fn exit_table_refine(&mut self) -> bool {
        let Some(session) = self.refine.take() else {
            return false;
        };
        self.pending = None;
        self.insert_hint = None;
        self.interaction = Interaction::Idle;
        if self.regions != session.regions_at_entry {
            self.record();
        }
        debug!("left refinement of {}", session.state.region_id);
        true
    }

    pub async fn run_grid_request<P>(&mut self, provider: &P, request: GridRequest) -> Result<bool>
    where
        P: GridProvider + ?Sized,
    {
        let ticket = request.ticket;
        let result = provider.analyze_grid(request).await;
        self.resolve_grid(ticket, result)
    }

    pub async fn enter_table_refine<P>(&mut self, provider: &P, region_id: &str) -> Result<()>
    where
        P: GridProvider + ?Sized,
    {
        let request = self.request_table_refine(region_id)?;
        self.run_grid_request(provider, request).await?;
        Ok(())
    }

    pub async fn reanalyze_table<P>(&mut self, provider: &P) -> Result<()>
    where
        P: GridProvider + ?Sized,
    {
        let request = self.request_table_reanalysis()?;
        self.run_grid_request(provider, request).await?;
        Ok(())
    }
}
