#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolStats {
    pub object_size: usize,
    pub page_size: usize,
    pub pages_in_use: usize,
    pub objects_in_use: usize,
    pub free_objects: usize,
    pub allocations: u32,
    pub deallocations: u32,
    /// Most objects in use at the same time
    pub most_objects: usize,
}

impl PoolStats {
    pub fn new(object_size: usize, page_size: usize) -> Self {
        Self {
            object_size,
            page_size,
            ..Default::default()
        }
    }

    /// Bytes held in pages
    pub fn memory_budget(&self) -> usize {
        self.pages_in_use * self.page_size
    }

    /// Fraction of pooled slots currently handed out
    pub fn utilization(&self) -> f64 {
        let slots = self.objects_in_use + self.free_objects;
        if slots == 0 {
            0.0
        } else {
            self.objects_in_use as f64 / slots as f64
        }
    }

    pub(crate) fn record_allocation(&mut self) {
        self.allocations = self.allocations.wrapping_add(1);
        self.objects_in_use += 1;
        self.free_objects -= 1;
        if self.objects_in_use > self.most_objects {
            self.most_objects = self.objects_in_use;
        }
    }

    pub(crate) fn record_deallocation(&mut self) {
        self.deallocations = self.deallocations.wrapping_add(1);
        self.objects_in_use = self.objects_in_use.saturating_sub(1);
        self.free_objects += 1;
    }
}
