// Configuration file, all measurements in the units of the input geometry
// (geographic degrees for everything the tile renderer touches)
// This controls the fixed heuristics of the generation pipeline

// Parcel subdivision
pub const PARCEL_MIN_AREA: f64 = 0.0001;      // blocks above this area keep splitting
pub const PARCEL_MAX_DEPTH: usize = 4;        // recursion stops once depth exceeds this
pub const AREA_TOLERANCE: f64 = 1e-9;         // relative slack when comparing areas against PARCEL_MIN_AREA
pub const REGULAR_ASPECT_MIN: f64 = 0.5;      // envelope aspect ratio window for "regular" blocks
pub const REGULAR_ASPECT_MAX: f64 = 2.0;
pub const REGULAR_MAX_VERTICES: usize = 6;

// Polygonization
pub const NODE_SNAP_TOLERANCE: f64 = 1e-9;    // endpoints closer than this are the same node

// Land-use scoring
pub const ROAD_QUERY_BUFFER: f64 = 0.01;      // envelope expansion for road proximity queries
pub const MIN_NETWORK_RADIUS: f64 = 1.0;      // floor for degenerate networks
pub const MIN_LAND_USE_WEIGHT: f64 = 0.1;

pub const COMMERCIAL_PRIMARY_DIST: f64 = 0.005;
pub const COMMERCIAL_PRIMARY_BONUS: f64 = 50.0;
pub const COMMERCIAL_CENTER_WEIGHT: f64 = 30.0;
pub const COMMERCIAL_CENTER_RADIUS: f64 = 0.4; // fraction of network radius

pub const RESIDENTIAL_BASE: f64 = 20.0;
pub const RESIDENTIAL_RING_BONUS: f64 = 30.0;
pub const RESIDENTIAL_RING_INNER: f64 = 0.1;
pub const RESIDENTIAL_RING_OUTER: f64 = 0.7;
pub const RESIDENTIAL_ROAD_DIST: f64 = 0.002;
pub const RESIDENTIAL_ROAD_BONUS: f64 = 20.0;

pub const INDUSTRIAL_PRIMARY_DIST: f64 = 0.01;
pub const INDUSTRIAL_PRIMARY_BONUS: f64 = 20.0;
pub const INDUSTRIAL_EDGE_WEIGHT: f64 = 40.0;
pub const INDUSTRIAL_EDGE_RADIUS: f64 = 0.6;

pub const PARK_BASE: f64 = 5.0;
pub const PARK_RESIDENTIAL_SCALE: f64 = 70.0;
pub const PARK_RESIDENTIAL_WEIGHT: f64 = 15.0;

// Building footprints, inset as a fraction of the parcel envelope width
pub const COMMERCIAL_INSET: f64 = 0.05;
pub const RESIDENTIAL_INSET: f64 = 0.15;
pub const INDUSTRIAL_INSET: f64 = 0.10;

// Generation manager
pub const MANAGER_CELL_SIZE: u32 = 10;
pub const QUEUE_YIELD_MS: u64 = 10;           // pause between queued areas

// Procedural road networks
pub const GRID_LINES_MIN: usize = 4;
pub const GRID_LINES_MAX: usize = 50;
pub const PRIMARY_EVERY: usize = 4;           // every n-th grid line is a primary road
pub const ORGANIC_POINT_COUNT: usize = 40;
pub const ORGANIC_JITTER: f64 = 0.35;         // std-dev of seed jitter, in grid steps
pub const INITIAL_SEED: u64 = 1512086461918454205;
pub const GENERATOR_CACHE_CAPACITY: usize = 256; // finished models kept per generator, oldest evicted first

// Tiles
pub const TILE_SIZE_PX: u32 = 512;
pub const PIXELS_PER_CELL_LEVELS: [u32; 10] = [3, 4, 6, 10, 40, 80, 160, 320, 640, 1280];
pub const PRIMARY_ROAD_WIDTH_PX: f64 = 3.0;
pub const SECONDARY_ROAD_WIDTH_PX: f64 = 1.5;

// Palette (rgba)
pub const COMMERCIAL_COLOR: [u8; 4] = [200, 50, 50, 180];
pub const RESIDENTIAL_COLOR: [u8; 4] = [50, 50, 200, 180];
pub const INDUSTRIAL_COLOR: [u8; 4] = [120, 120, 120, 180];
pub const PARK_COLOR: [u8; 4] = [60, 160, 60, 180];
pub const UNKNOWN_COLOR: [u8; 4] = [100, 100, 100, 180];
pub const PRIMARY_ROAD_COLOR: [u8; 4] = [250, 210, 120, 230];
pub const SECONDARY_ROAD_COLOR: [u8; 4] = [230, 230, 230, 200];
