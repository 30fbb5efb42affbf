use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::dedup::{self, DedupMode};
use crate::geometry::{Rect, clamp_to_unit};
use crate::grid::TableSettings;
use crate::history::{DEFAULT_HISTORY_LIMIT, History};
use crate::interaction::{InsertHint, Interaction, Viewport};
use crate::providers::{
    DetectionProvider, DetectionRequest, DetectionResponse, ExtractedField, ExtractionProvider,
    ExtractionRequest, FieldGeometry, GridRequest, PageRef,
};
use crate::region::{Region, RegionSet, RegionType};
use crate::settings::Settings;
use crate::template::{Template, TemplateMode};

mod anchors;
mod pointer;
mod table;

pub use table::RefineSession;
use table::PendingGrid;

#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    pub history_limit: usize,
    pub dedup_mode: DedupMode,
    pub min_draw_size: f64,
    pub min_region_size: f64,
    pub line_hit_tolerance_px: f64,
    pub handle_hit_tolerance_px: f64,
    pub edge_hover_margin: f64,
    pub table_defaults: TableSettings,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            dedup_mode: DedupMode::default(),
            min_draw_size: 0.005,
            min_region_size: 0.001,
            line_hit_tolerance_px: 12.0,
            handle_hit_tolerance_px: 6.0,
            edge_hover_margin: 0.04,
            table_defaults: TableSettings::default(),
        }
    }
}

impl EditorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            history_limit: settings.history_limit,
            dedup_mode: settings.dedup_mode,
            min_draw_size: settings.min_draw_size,
            min_region_size: settings.min_region_size,
            line_hit_tolerance_px: settings.line_hit_tolerance_px,
            handle_hit_tolerance_px: settings.handle_hit_tolerance_px,
            edge_hover_margin: settings.edge_hover_margin,
            table_defaults: settings.table_defaults(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorMode {
    #[default]
    View,
    Add,
}

/// What a pointer event did to the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    /// Transient state changed (selection, live drag); nothing recorded.
    Updated,
    /// A gesture finished and one history entry was recorded.
    Committed,
    /// The table grid changed and must be analyzed again.
    Reanalyze(GridRequest),
}

/// Single owner of the annotation state. Every mutation goes through its
/// methods so history and interaction stay consistent.
#[derive(Debug)]
pub struct Editor {
    config: EditorConfig,
    regions: RegionSet,
    history: History<RegionSet>,
    selected: Option<String>,
    mode: EditorMode,
    viewport: Viewport,
    filter: BTreeSet<RegionType>,
    interaction: Interaction,
    refine: Option<RefineSession>,
    insert_hint: Option<InsertHint>,
    pending: Option<PendingGrid>,
    next_ticket: u64,
    extracted: Vec<ExtractedField>,
    page: PageRef,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        let history = History::new(RegionSet::default(), config.history_limit);
        Self {
            config,
            regions: RegionSet::default(),
            history,
            selected: None,
            mode: EditorMode::default(),
            viewport: Viewport::default(),
            filter: BTreeSet::new(),
            interaction: Interaction::Idle,
            refine: None,
            insert_hint: None,
            pending: None,
            next_ticket: 0,
            extracted: Vec::new(),
            page: PageRef::default(),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn regions(&self) -> &[Region] {
        self.regions.as_slice()
    }

    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions.get(id)
    }

    pub fn visible_regions(&self) -> impl DoubleEndedIterator<Item = &Region> {
        self.regions.visible(&self.filter)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_region(&self) -> Option<&Region> {
        self.regions.get(self.selected.as_deref()?)
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: EditorMode) {
        if self.mode != mode {
            debug!("editor mode {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Returns `false` and keeps the previous viewport if the new one is degenerate.
    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        if !viewport.is_valid() {
            warn!("ignoring degenerate viewport {:?}", viewport);
            return false;
        }
        self.viewport = viewport;
        true
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn page(&self) -> &PageRef {
        &self.page
    }

    pub fn set_page(&mut self, page: PageRef) {
        self.page = page;
    }

    pub fn extracted(&self) -> &[ExtractedField] {
        &self.extracted
    }

    pub fn can_undo(&self) -> bool {
        match &self.refine {
            Some(session) => session.history.can_undo(),
            None => self.history.can_undo(),
        }
    }

    pub fn can_redo(&self) -> bool {
        match &self.refine {
            Some(session) => session.history.can_redo(),
            None => self.history.can_redo(),
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn filter(&self) -> &BTreeSet<RegionType> {
        &self.filter
    }

    /// Limits visible (and hittable) regions to `types`; empty shows all.
    pub fn set_filter(&mut self, types: BTreeSet<RegionType>) {
        self.filter = types;
        if let Some(selected) = self.selected_region()
            && !self.filter.is_empty()
            && !self.filter.contains(&selected.kind)
        {
            self.selected = None;
        }
    }

    pub fn select(&mut self, id: &str) -> bool {
        let visible = self.visible_regions().any(|region| region.id == id);
        if !visible {
            return false;
        }
        self.selected = Some(id.to_string());
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    fn refine_blocks(&self, operation: &str) -> bool {
        if let Some(session) = &self.refine {
            debug!("{} ignored while refining table {}", operation, session.state.region_id);
            return true;
        }
        false
    }

    fn record(&mut self) {
        self.history.record(&self.regions);
    }

    fn commit(&mut self, changed: bool) -> bool {
        if changed {
            self.record();
        }
        changed
    }

    /// Records a snapshot when the live set differs from the last one.
    fn commit_if_changed(&mut self) -> bool {
        let changed = self.history.current() != Some(&self.regions);
        self.commit(changed)
    }

    pub fn move_region(&mut self, id: &str, x: f64, y: f64) -> bool {
        if self.refine_blocks("move") {
            return false;
        }
        let changed = self.regions.move_to(id, x, y);
        self.commit(changed)
    }

    pub fn resize_region(&mut self, id: &str, rect: Rect) -> bool {
        if self.refine_blocks("resize") {
            return false;
        }
        let changed = self.regions.set_rect(id, rect);
        self.commit(changed)
    }

    pub fn set_region_type(&mut self, id: &str, kind: RegionType) -> bool {
        if self.refine_blocks("set type") {
            return false;
        }
        let changed = self.regions.set_type(id, kind);
        self.commit(changed)
    }

    pub fn set_region_label(&mut self, id: &str, label: &str) -> bool {
        if self.refine_blocks("set label") {
            return false;
        }
        let changed = self.regions.set_label(id, label);
        self.commit(changed)
    }

    pub fn set_region_remarks(&mut self, id: &str, remarks: &str) -> bool {
        if self.refine_blocks("set remarks") {
            return false;
        }
        let changed = self.regions.set_remarks(id, remarks);
        self.commit(changed)
    }

    pub fn toggle_region_lock(&mut self, id: &str) -> bool {
        if self.refine_blocks("toggle lock") {
            return false;
        }
        let changed = self.regions.toggle_lock(id);
        self.commit(changed)
    }

    /// Deletes regardless of the lock flag; locking guards geometry only.
    pub fn delete_region(&mut self, id: &str) -> bool {
        if self.refine_blocks("delete") {
            return false;
        }
        let removed = self.regions.remove(id).is_some();
        if removed && self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        self.commit(removed)
    }

    pub fn delete_selected(&mut self) -> bool {
        match self.selected.clone() {
            Some(id) => self.delete_region(&id),
            None => false,
        }
    }

    /// Adds a user region in the `custom` namespace and selects it.
    pub fn add_region(&mut self, rect: Rect) -> Option<String> {
        if self.refine_blocks("add") {
            return None;
        }
        let min = self.config.min_draw_size;
        if !rect.is_finite() || rect.width <= min || rect.height <= min {
            debug!("discarding undersized region {:?}", rect);
            return None;
        }
        let id = self.regions.next_custom_id();
        let region = Region::new(id.clone(), RegionType::Custom, clamp_to_unit(rect))
            .with_label(RegionType::Custom.display_name());
        if let Err(err) = self.regions.push(region) {
            warn!("{}", err);
            return None;
        }
        self.selected = Some(id.clone());
        self.record();
        info!("added region {}", id);
        Some(id)
    }

    /// Replaces the whole set as one undoable step.
    pub fn replace_regions(&mut self, regions: Vec<Region>) -> bool {
        if self.refine_blocks("replace") {
            return false;
        }
        self.regions = RegionSet::new(sanitize_regions(regions));
        self.selected = None;
        self.commit_if_changed()
    }

    pub fn clear_regions(&mut self) -> bool {
        if self.regions.is_empty() {
            return false;
        }
        self.replace_regions(Vec::new())
    }

    /// Validates, merges and installs detector output, leaving table
    /// refinement first. Returns the number of regions kept.
    pub fn ingest_detection(&mut self, response: &DetectionResponse) -> usize {
        if self.refine.is_some() {
            self.exit_table_refine();
        }
        let regions = dedup::ingest(&response.regions, self.config.dedup_mode);
        let count = regions.len();
        info!(
            "ingested {} of {} detected regions ({:?} dedup)",
            count,
            response.regions.len(),
            self.config.dedup_mode
        );
        let page = response.page();
        if !page.id.is_empty() || !page.filename.is_empty() {
            self.page = page;
        }
        self.regions = RegionSet::new(regions);
        self.selected = None;
        self.interaction = Interaction::Idle;
        self.extracted.clear();
        self.record();
        count
    }

    pub fn set_dedup_mode(&mut self, mode: DedupMode) {
        self.config.dedup_mode = mode;
    }

    /// Installs a stored layout and starts a fresh timeline from it.
    pub fn load_template(&mut self, template: Template) {
        self.refine = None;
        self.pending = None;
        self.insert_hint = None;
        self.interaction = Interaction::Idle;
        self.selected = None;
        self.extracted.clear();
        if let Some(filename) = template.filename.filter(|name| !name.trim().is_empty()) {
            self.page.filename = filename;
        }
        self.regions = RegionSet::new(sanitize_regions(template.regions));
        self.history.reset(self.regions.clone());
        info!("loaded template '{}' with {} regions", template.name, self.regions.len());
    }

    pub fn to_template(&self, name: &str, mode: TemplateMode) -> Template {
        let mut template = Template::new(name, mode, self.regions.clone().into_vec());
        if !self.page.filename.is_empty() {
            template.filename = Some(self.page.filename.clone());
        }
        template
    }

    /// Steps back on whichever timeline is live. Ignored mid-gesture.
    pub fn undo(&mut self) -> bool {
        if !self.interaction.is_idle() {
            return false;
        }
        if let Some(session) = &mut self.refine {
            let Some(state) = session.history.undo() else {
                return false;
            };
            session.state = state;
            self.pending = None;
            return true;
        }
        let Some(regions) = self.history.undo() else {
            return false;
        };
        self.restore(regions);
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.interaction.is_idle() {
            return false;
        }
        if let Some(session) = &mut self.refine {
            let Some(state) = session.history.redo() else {
                return false;
            };
            session.state = state;
            self.pending = None;
            return true;
        }
        let Some(regions) = self.history.redo() else {
            return false;
        };
        self.restore(regions);
        true
    }

    fn restore(&mut self, regions: RegionSet) {
        self.regions = regions;
        if let Some(id) = self.selected.as_deref()
            && !self.regions.contains(id)
        {
            self.selected = None;
        }
    }

    /// Detects the page layout and replaces the region set on success.
    pub async fn analyze_page<P>(&mut self, provider: &P, request: DetectionRequest) -> Result<usize>
    where
        P: DetectionProvider + ?Sized,
    {
        let filename = request.filename.clone();
        let response = provider
            .detect(request)
            .await
            .with_context(|| format!("layout analysis failed for {}", filename))?;
        Ok(self.ingest_detection(&response))
    }

    /// Asks the extraction collaborator for region contents. The results are
    /// kept for display only and never touch region state.
    pub async fn extract_fields<P>(&mut self, provider: &P) -> Result<usize>
    where
        P: ExtractionProvider + ?Sized,
    {
        let request = ExtractionRequest {
            page: self.page.clone(),
            regions: self.regions.iter().map(FieldGeometry::from_region).collect(),
        };
        let fields = provider.extract(request).await.context("field extraction failed")?;
        let count = fields.len();
        self.extracted = fields;
        Ok(count)
    }
}

/// Drops regions that cannot be placed or whose id repeats, and clamps the rest.
fn sanitize_regions(regions: Vec<Region>) -> Vec<Region> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(regions.len());
    for mut region in regions {
        let rect = region.rect;
        if !rect.is_finite() || rect.width <= 0.0 || rect.height <= 0.0 {
            warn!("dropping region {} with invalid geometry {:?}", region.id, rect);
            continue;
        }
        if !seen.insert(region.id.clone()) {
            warn!("dropping duplicate region id {}", region.id);
            continue;
        }
        region.rect = clamp_to_unit(rect);
        if region.kind != RegionType::Table {
            region.table_settings = None;
        }
        kept.push(region);
    }
    kept
}
