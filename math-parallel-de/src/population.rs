//! Double-buffered population storage.
//!
//! Two arenas of identical shape hold `P x genome_size` genes and `P` fitness
//! values each. One arena is *current* (read by every worker during a pass),
//! the other is *trial* (each worker writes only the slots of its own
//! partition). Between generations the coordinator flips a tag; nothing is
//! copied.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};

struct Arena {
    genomes: Box<[UnsafeCell<f64>]>,
    fitness: Box<[UnsafeCell<f64>]>,
}

impl Arena {
    fn from_values(genomes: &Array2<f64>, fitness: &Array1<f64>) -> Self {
        Self {
            genomes: genomes.iter().map(|&v| UnsafeCell::new(v)).collect(),
            fitness: fitness.iter().map(|&v| UnsafeCell::new(v)).collect(),
        }
    }

    fn genome_ptr(&self, offset: usize) -> *mut f64 {
        debug_assert!(offset <= self.genomes.len());
        // SAFETY: `offset` is within the allocation (or one past its end for
        // an empty trailing view); `UnsafeCell<f64>` has the layout of `f64`.
        unsafe { UnsafeCell::raw_get(self.genomes.as_ptr().add(offset)) }
    }

    fn fitness_ptr(&self, offset: usize) -> *mut f64 {
        debug_assert!(offset <= self.fitness.len());
        // SAFETY: as for `genome_ptr`.
        unsafe { UnsafeCell::raw_get(self.fitness.as_ptr().add(offset)) }
    }
}

/// The two population arenas plus the current/trial tag.
pub struct PopulationBuffers {
    population_size: usize,
    genome_size: usize,
    arenas: [Arena; 2],
    current: AtomicUsize,
}

// SAFETY: cells are only written through `trial_slot`, whose contract confines
// each worker to its own partition of the trial arena while nobody reads it,
// and the tag flip happens while every worker is parked on its permission flag.
unsafe impl Sync for PopulationBuffers {}

impl PopulationBuffers {
    /// Seeds both arenas with an evaluated initial population.
    ///
    /// `genomes` must be `population_size x genome_size` and `fitness` must hold
    /// one value per row.
    pub fn from_initial(genomes: &Array2<f64>, fitness: &Array1<f64>) -> Self {
        assert_eq!(
            genomes.nrows(),
            fitness.len(),
            "one fitness value per individual"
        );
        Self {
            population_size: genomes.nrows(),
            genome_size: genomes.ncols(),
            arenas: [
                Arena::from_values(genomes, fitness),
                Arena::from_values(genomes, fitness),
            ],
            current: AtomicUsize::new(0),
        }
    }

    /// Number of individuals per arena.
    pub fn population_size(&self) -> usize {
        self.population_size
    }

    /// Number of genes per individual.
    pub fn genome_size(&self) -> usize {
        self.genome_size
    }

    /// Index (0 or 1) of the arena currently playing the *current* role.
    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Exchanges the current and trial roles. O(1), nothing is copied.
    pub(crate) fn swap(&self) {
        self.current.fetch_xor(1, Ordering::AcqRel);
    }

    /// Read-only view of the current arena.
    ///
    /// # Safety
    ///
    /// No thread may swap the buffers while the returned views are alive.
    pub(crate) unsafe fn current_view(&self) -> (ArrayView2<'_, f64>, ArrayView1<'_, f64>) {
        let arena = &self.arenas[self.current_index()];
        // SAFETY: the arena owns exactly population_size * genome_size genes and
        // population_size fitness values; the caller guarantees nobody writes
        // the current arena while the views are alive.
        unsafe {
            (
                ArrayView2::from_shape_ptr(
                    (self.population_size, self.genome_size),
                    arena.genome_ptr(0) as *const f64,
                ),
                ArrayView1::from_shape_ptr(self.population_size, arena.fitness_ptr(0) as *const f64),
            )
        }
    }

    /// Mutable access to slot `index` of the trial arena.
    ///
    /// # Safety
    ///
    /// `index` must belong to the calling worker's partition, no other slot
    /// handle for `index` may be alive, and the buffers must not be swapped
    /// while the handle is alive.
    pub(crate) unsafe fn trial_slot(&self, index: usize) -> TrialSlot<'_> {
        assert!(index < self.population_size, "trial slot out of range");
        let arena = &self.arenas[self.current_index() ^ 1];
        // SAFETY: the row lies inside the arena and is exclusively owned by the
        // caller per the contract above.
        unsafe {
            TrialSlot {
                fitness: &mut *arena.fitness_ptr(index),
                genome: ArrayViewMut1::from_shape_ptr(
                    self.genome_size,
                    arena.genome_ptr(index * self.genome_size),
                ),
            }
        }
    }

    /// Fitness currently stored in trial slot `index`.
    ///
    /// # Safety
    ///
    /// Same as [`trial_slot`](Self::trial_slot), and no slot handle for
    /// `index` may be alive.
    pub(crate) unsafe fn trial_fitness(&self, index: usize) -> f64 {
        assert!(index < self.population_size, "trial slot out of range");
        let arena = &self.arenas[self.current_index() ^ 1];
        // SAFETY: forwarded to the caller.
        unsafe { *arena.fitness_ptr(index) }
    }

    /// Copies the current arena out.
    ///
    /// # Safety
    ///
    /// Same as [`current_view`](Self::current_view).
    #[cfg(test)]
    pub(crate) unsafe fn snapshot(&self) -> (Array2<f64>, Array1<f64>) {
        // SAFETY: forwarded to the caller.
        let (genomes, fitness) = unsafe { self.current_view() };
        (genomes.to_owned(), fitness.to_owned())
    }
}

impl fmt::Debug for PopulationBuffers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopulationBuffers")
            .field("population_size", &self.population_size)
            .field("genome_size", &self.genome_size)
            .field("current", &self.current_index())
            .finish()
    }
}

/// One writable slot of the trial arena: a fitness value and its genome row.
pub struct TrialSlot<'a> {
    /// Fitness of the individual stored in this slot.
    pub fitness: &'a mut f64,
    /// Genome of the individual stored in this slot.
    pub genome: ArrayViewMut1<'a, f64>,
}

impl TrialSlot<'_> {
    /// Stores `genome` with `fitness` into the slot.
    pub fn write(&mut self, fitness: f64, genome: ArrayView1<'_, f64>) {
        *self.fitness = fitness;
        self.genome.assign(&genome);
    }
}

/// A single candidate solution.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    /// Objective value, lower is better.
    pub fitness: f64,
    /// Decision variables.
    pub genome: Array1<f64>,
}

/// Borrowed state of the population right after a generation completed.
///
/// Handed to observers and termination predicates on the leader thread; valid
/// until the next buffer swap.
#[derive(Debug, Clone, Copy)]
pub struct GenerationView<'a> {
    /// Number of completed generations, starting at 1.
    pub generation: usize,
    /// Index of the best individual.
    pub best_index: usize,
    /// Genomes of the current population, one row per individual.
    pub genomes: ArrayView2<'a, f64>,
    /// Fitness of the current population.
    pub fitness: ArrayView1<'a, f64>,
}

impl<'a> GenerationView<'a> {
    /// Fitness of the best individual.
    pub fn best_fitness(&self) -> f64 {
        self.fitness[self.best_index]
    }

    /// Genome of the best individual.
    pub fn best_genome(&self) -> ArrayView1<'a, f64> {
        self.genomes.index_axis_move(Axis(0), self.best_index)
    }

    /// Population size.
    pub fn population_size(&self) -> usize {
        self.fitness.len()
    }

    /// Copies the view into an owned result.
    pub fn to_owned(&self) -> GenerationResult {
        GenerationResult {
            generation: self.generation,
            best_index: self.best_index,
            population: self.genomes.to_owned(),
            population_fitness: self.fitness.to_owned(),
        }
    }
}

/// Owned snapshot of a generation, delivered through the run future.
#[derive(Clone)]
pub struct GenerationResult {
    /// Number of completed generations.
    pub generation: usize,
    /// Index of the best individual in `population`.
    pub best_index: usize,
    /// Final population matrix (P x genome size).
    pub population: Array2<f64>,
    /// Fitness values for each population member.
    pub population_fitness: Array1<f64>,
}

impl GenerationResult {
    /// Fitness of the best individual.
    pub fn best_fitness(&self) -> f64 {
        self.population_fitness[self.best_index]
    }

    /// Genome of the best individual.
    pub fn best_genome(&self) -> ArrayView1<'_, f64> {
        self.population.row(self.best_index)
    }

    /// The best individual, copied out.
    pub fn best_individual(&self) -> Individual {
        Individual {
            fitness: self.best_fitness(),
            genome: self.best_genome().to_owned(),
        }
    }

    /// Individual `index`, if it exists.
    pub fn individual(&self, index: usize) -> Option<Individual> {
        (index < self.population_fitness.len()).then(|| Individual {
            fitness: self.population_fitness[index],
            genome: self.population.row(index).to_owned(),
        })
    }
}

impl fmt::Debug for GenerationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationResult")
            .field("generation", &self.generation)
            .field("best_index", &self.best_index)
            .field("best_fitness", &self.best_fitness())
            .field(
                "population",
                &format!("{}x{}", self.population.nrows(), self.population.ncols()),
            )
            .finish()
    }
}
