/// Storage for id-addressed elements that tolerates holes. Removal leaves a
/// hole and recycles the index on the next add, so ids stay stable without
/// shifting the vector.
pub struct SparseCollection<T: SparseElement> {
    vector: Vec<Option<T>>,
    index_free_list: Vec<usize>,
}

impl<T: SparseElement> SparseCollection<T> {
    pub fn new() -> Self {
        Self {
            vector: Vec::new(),
            index_free_list: Vec::new(),
        }
    }

    pub fn add(&mut self, mut element: T) -> T::Id {
        let id = if let Some(id) = self.index_free_list.pop() {
            id
        } else {
            self.vector.push(None);
            self.vector.len() - 1
        };
        element.set_id(id.into());
        self.vector[id] = Some(element);

        id.into()
    }

    pub fn size(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.iter().all(|x| x.is_none())
    }

    pub fn at(&self, id: T::Id) -> Option<&T> {
        let id = id.into();
        if id < self.vector.len() {
            self.vector[id].as_ref()
        } else {
            None
        }
    }

    pub fn at_mut(&mut self, id: T::Id) -> Option<&mut T> {
        let id = id.into();
        if id < self.vector.len() {
            self.vector[id].as_mut()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.vector.iter().filter_map(|x| x.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.vector.iter_mut().filter_map(|x| x.as_mut())
    }

    pub fn remove(&mut self, id: T::Id) {
        self.index_free_list.push(id.into());
        self.vector[id.into()] = None;
    }
}

impl<T: SparseElement> Default for SparseCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub trait SparseElement {
    type Id: Copy + Eq + std::hash::Hash + Into<usize> + From<usize>;

    fn id(&self) -> Self::Id;
    fn set_id(&mut self, id: Self::Id);
}
